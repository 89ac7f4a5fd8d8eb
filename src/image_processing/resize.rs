use anyhow::Result;
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Resampling filter, numbered like the PIL constants used in
/// `preprocessor_config.json` (`resample`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Resample {
    Nearest,
    Lanczos,
    Bilinear,
    Bicubic,
    Box,
    Hamming,
}

impl From<u8> for Resample {
    fn from(value: u8) -> Self {
        match value {
            0 => Resample::Nearest,
            1 => Resample::Lanczos,
            3 => Resample::Bicubic,
            4 => Resample::Box,
            5 => Resample::Hamming,
            _ => Resample::Bilinear,
        }
    }
}

impl From<Resample> for u8 {
    fn from(value: Resample) -> Self {
        match value {
            Resample::Nearest => 0,
            Resample::Lanczos => 1,
            Resample::Bilinear => 2,
            Resample::Bicubic => 3,
            Resample::Box => 4,
            Resample::Hamming => 5,
        }
    }
}

impl Resample {
    fn algorithm(&self) -> ResizeAlg {
        match self {
            Resample::Nearest => ResizeAlg::Nearest,
            Resample::Lanczos => ResizeAlg::Convolution(FilterType::Lanczos3),
            Resample::Bilinear => ResizeAlg::Convolution(FilterType::Bilinear),
            Resample::Bicubic => ResizeAlg::Convolution(FilterType::CatmullRom),
            Resample::Box => ResizeAlg::Convolution(FilterType::Box),
            Resample::Hamming => ResizeAlg::Convolution(FilterType::Hamming),
        }
    }
}

/// Resize an image to exact dimensions (no aspect-ratio preservation,
/// matching what the ViT image processor does)
pub fn resize_exact(img: &RgbImage, width: u32, height: u32, resample: Resample) -> Result<RgbImage> {
    let (src_width, src_height) = img.dimensions();

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    let src_width_nz = NonZeroU32::new(src_width).ok_or_else(|| anyhow::anyhow!("Source width is zero"))?;
    let src_height_nz = NonZeroU32::new(src_height).ok_or_else(|| anyhow::anyhow!("Source height is zero"))?;
    let dst_width_nz = NonZeroU32::new(width).ok_or_else(|| anyhow::anyhow!("Target width is zero"))?;
    let dst_height_nz = NonZeroU32::new(height).ok_or_else(|| anyhow::anyhow!("Target height is zero"))?;

    let src_image = Image::from_vec_u8(
        src_width_nz.get(),
        src_height_nz.get(),
        img.as_raw().clone(),
        PixelType::U8x3,
    )?;

    let mut dst_image = Image::new(dst_width_nz.get(), dst_height_nz.get(), PixelType::U8x3);

    let mut resizer = Resizer::new();
    let options = ResizeOptions::new().resize_alg(resample.algorithm());
    resizer.resize(&src_image, &mut dst_image, Some(&options))?;

    RgbImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("Resized buffer does not match {}x{}", width, height))
}

pub mod mood_detection;
pub mod onnx_classifier;
pub mod orientation;
pub mod preprocess;
pub mod resize;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::fs;
use std::path::Path;

pub use mood_detection::{detect_mood, MoodClassifier};
pub use preprocess::Preprocessor;

/// Channel layout of a raw pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Red, green, blue (webcam frames, decoded files)
    Rgb,
    /// Blue, green, red (OpenCV-style capture buffers)
    Bgr,
}

/// One image in any of the accepted forms
#[derive(Debug, Clone, Copy)]
pub enum ImageInput<'a> {
    /// Raw interleaved 8-bit pixels, 3 channels
    Pixels {
        data: &'a [u8],
        width: u32,
        height: u32,
        order: ChannelOrder,
    },
    /// An image file on disk
    Path(&'a Path),
    /// An encoded image held in memory (e.g. an uploaded file)
    Bytes(&'a [u8]),
}

impl ImageInput<'_> {
    /// Normalize to a single upright RGB image
    pub fn to_rgb(&self) -> Result<RgbImage> {
        match self {
            ImageInput::Pixels {
                data,
                width,
                height,
                order,
            } => pixels_to_rgb(data, *width, *height, *order),
            ImageInput::Path(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("Failed to read image: {}", path.display()))?;
                decode_image(&bytes)
                    .with_context(|| format!("Failed to decode image: {}", path.display()))
            }
            ImageInput::Bytes(bytes) => decode_image(bytes),
        }
    }
}

/// Decode encoded image bytes to RGB, honouring the EXIF orientation tag
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    let decoded = image::load_from_memory(bytes).context("Unsupported or corrupt image data")?;
    let rgb = decoded.to_rgb8();
    ensure_not_empty(&rgb)?;

    let exif_orientation = orientation::read_exif_orientation(bytes);
    Ok(orientation::apply_rotation(rgb, exif_orientation))
}

fn pixels_to_rgb(data: &[u8], width: u32, height: u32, order: ChannelOrder) -> Result<RgbImage> {
    let expected = width as usize * height as usize * 3;
    if data.len() != expected {
        return Err(anyhow!(
            "Pixel buffer has {} bytes, expected {} for {}x{} RGB",
            data.len(),
            expected,
            width,
            height
        ));
    }

    let buffer = match order {
        ChannelOrder::Rgb => data.to_vec(),
        ChannelOrder::Bgr => data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
    };

    let rgb = RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| anyhow!("Invalid pixel buffer for {}x{}", width, height))?;
    ensure_not_empty(&rgb)?;
    Ok(rgb)
}

fn ensure_not_empty(img: &RgbImage) -> Result<()> {
    if img.width() == 0 || img.height() == 0 {
        return Err(anyhow!("Image has zero size"));
    }
    Ok(())
}

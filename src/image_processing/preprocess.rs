//! ViT-style image preprocessing.
//!
//! Reads the same `preprocessor_config.json` that ships with a Hugging Face
//! image-classification model and turns an RGB image into the `pixel_values`
//! tensor the classifier expects: resize, rescale, normalize, NCHW layout.

use anyhow::{Context, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::resize::{resize_exact, Resample};

const DEFAULT_SIZE: u32 = 224;
const DEFAULT_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const DEFAULT_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Target size as written by the image processor config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeSpec {
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub shortest_edge: Option<u32>,
}

impl SizeSpec {
    /// Resolve to (width, height); a lone `shortest_edge` means a square input
    fn resolve(&self) -> (u32, u32) {
        match (self.width, self.height, self.shortest_edge) {
            (Some(w), Some(h), _) => (w, h),
            (_, _, Some(edge)) => (edge, edge),
            (Some(w), None, None) => (w, w),
            (None, Some(h), None) => (h, h),
            (None, None, None) => (DEFAULT_SIZE, DEFAULT_SIZE),
        }
    }
}

/// Preprocessing transform, deserialized from `preprocessor_config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocessor {
    pub do_resize: bool,
    pub size: SizeSpec,
    pub resample: Resample,
    pub do_rescale: bool,
    pub rescale_factor: f32,
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: SizeSpec {
                height: Some(DEFAULT_SIZE),
                width: Some(DEFAULT_SIZE),
                shortest_edge: None,
            },
            resample: Resample::Bilinear,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: DEFAULT_MEAN,
            image_std: DEFAULT_STD,
        }
    }
}

impl Preprocessor {
    /// Load the transform from a `preprocessor_config.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preprocessor config: {:?}", path))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse preprocessor config: {:?}", path))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let preprocessor: Preprocessor = serde_json::from_str(json)?;
        if preprocessor.image_std.iter().any(|s| *s == 0.0) {
            anyhow::bail!("image_std must not contain zeros");
        }
        Ok(preprocessor)
    }

    /// Model input size as (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        self.size.resolve()
    }

    /// Tensor shape `[batch, channels, height, width]` for one image
    pub fn input_shape(&self, img: &RgbImage) -> [usize; 4] {
        let (width, height) = if self.do_resize {
            self.input_size()
        } else {
            img.dimensions()
        };
        [1, 3, height as usize, width as usize]
    }

    /// Turn an RGB image into NCHW `pixel_values`
    pub fn prepare(&self, img: &RgbImage) -> Result<(Vec<f32>, [usize; 4])> {
        let shape = self.input_shape(img);
        let (height, width) = (shape[2], shape[3]);

        let resized;
        let source = if self.do_resize {
            resized = resize_exact(img, width as u32, height as u32, self.resample)?;
            &resized
        } else {
            img
        };

        let plane = width * height;
        let mut tensor_data = vec![0.0f32; 3 * plane];

        for (index, pixel) in source.pixels().enumerate() {
            for c in 0..3 {
                let mut value = pixel[c] as f32;
                if self.do_rescale {
                    value *= self.rescale_factor;
                }
                if self.do_normalize {
                    value = (value - self.image_mean[c]) / self.image_std[c];
                }
                tensor_data[c * plane + index] = value;
            }
        }

        Ok((tensor_data, shape))
    }
}

// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an encoded image into the flat f32 buffer the model eats.
//
// Steps (applied in order):
//   1. Decode (JPEG / PNG / BMP / GIF, or an already decoded image)
//   2. Convert to 3-channel RGB (grayscale scans are expanded)
//   3. Bilinear resize to image_size × image_size
//   4. Normalise per channel
//   5. Lay out channel-first: [3, H, W]
//
// Normalisation must match the convention of the pretrained
// backbone weights, and inference must use the same one as
// training. It is stored in the model manifest for that reason.
//
//   Caffe (Keras VGG16 ImageNet weights):
//     channels reordered RGB → BGR
//     mean [103.939, 116.779, 123.68] subtracted, no scaling
//
//   Torch (torchvision VGG16 weights, the default backbone):
//     RGB scaled to [0, 1]
//     (x - [0.485, 0.456, 0.406]) / [0.229, 0.224, 0.225]

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];
const TORCH_MEAN_RGB: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD_RGB:  [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalisation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    Caffe,
    #[default]
    Torch,
}

impl std::str::FromStr for Normalization {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "caffe" => Ok(Normalization::Caffe),
            "torch" => Ok(Normalization::Torch),
            other   => anyhow::bail!("unknown normalization '{other}' (expected caffe or torch)"),
        }
    }
}

/// Raised when uploaded bytes cannot be decoded as an image.
/// The HTTP layer maps this to 400 instead of 500.
#[derive(Debug)]
pub struct UndecodableScan(pub String);

impl std::fmt::Display for UndecodableScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot decode scan: {}", self.0)
    }
}

impl std::error::Error for UndecodableScan {}

/// Decodes and normalises images into `[3, size, size]` f32 buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePreprocessor {
    pub image_size:    u32,
    pub normalization: Normalization,
}

impl ImagePreprocessor {
    pub fn new(image_size: u32, normalization: Normalization) -> Self {
        Self { image_size, normalization }
    }

    /// Number of f32 values produced per image.
    pub fn pixel_count(&self) -> usize {
        3 * (self.image_size as usize) * (self.image_size as usize)
    }

    /// Decode an in-memory encoded image.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| anyhow::Error::new(UndecodableScan(e.to_string())))
    }

    /// Read and preprocess an image file from disk.
    pub fn load_file(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        Ok(self.to_pixels(&img))
    }

    /// Resize, normalise and lay out an already decoded image.
    pub fn to_pixels(&self, img: &DynamicImage) -> Vec<f32> {
        let size = self.image_size;
        let rgb  = image::imageops::resize(&img.to_rgb8(), size, size, FilterType::Triangle);

        let plane = (size as usize) * (size as usize);
        let mut out = vec![0.0f32; 3 * plane];

        for (i, px) in rgb.pixels().enumerate() {
            let [r, g, b] = px.0;
            let (r, g, b) = (r as f32, g as f32, b as f32);

            match self.normalization {
                Normalization::Caffe => {
                    out[i]             = b - CAFFE_MEAN_BGR[0];
                    out[plane + i]     = g - CAFFE_MEAN_BGR[1];
                    out[2 * plane + i] = r - CAFFE_MEAN_BGR[2];
                }
                Normalization::Torch => {
                    out[i]             = (r / 255.0 - TORCH_MEAN_RGB[0]) / TORCH_STD_RGB[0];
                    out[plane + i]     = (g / 255.0 - TORCH_MEAN_RGB[1]) / TORCH_STD_RGB[1];
                    out[2 * plane + i] = (b / 255.0 - TORCH_MEAN_RGB[2]) / TORCH_STD_RGB[2];
                }
            }
        }

        out
    }
}

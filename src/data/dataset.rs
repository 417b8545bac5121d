use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::preprocessor::ImagePreprocessor;

/// One labelled scan on disk. Pixels are not loaded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSample {
    pub path:  PathBuf,
    pub label: usize,
}

impl ScanSample {
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self { path: path.into(), label }
    }
}

/// A decoded, normalised sample: `[3, H, W]` pixels, flattened.
#[derive(Debug, Clone)]
pub struct ScanItem {
    pub pixels: Vec<f32>,
    pub label:  usize,
}

/// Lazily decoding dataset over a list of scan files.
pub struct ScanDataset {
    samples:      Vec<ScanSample>,
    preprocessor: ImagePreprocessor,
}

impl ScanDataset {
    pub fn new(samples: Vec<ScanSample>, preprocessor: ImagePreprocessor) -> Self {
        Self { samples, preprocessor }
    }
}

impl Dataset<ScanItem> for ScanDataset {
    fn get(&self, index: usize) -> Option<ScanItem> {
        let sample = self.samples.get(index)?;

        // Files were header-checked by the loader; a decode failure here
        // means the file changed or is truncated past the header. Returning
        // None would end the DataLoader iteration early, so substitute a
        // blank image and keep going.
        let pixels = match self.preprocessor.load_file(&sample.path) {
            Ok(px) => px,
            Err(e) => {
                tracing::warn!("{e:#}; using a blank image instead");
                vec![0.0; self.preprocessor.pixel_count()]
            }
        };

        Some(ScanItem { pixels, label: sample.label })
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

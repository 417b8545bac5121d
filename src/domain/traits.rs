// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The outer layers only see these traits:
//   - the training use case asks a ScanSource for samples
//   - the HTTP server asks a ScanClassifier for predictions
//
// A test can hand the server a stub classifier without
// loading any model weights.

use anyhow::Result;

use crate::data::dataset::ScanSample;
use crate::domain::prediction::{Prediction, ScanUpload};

// ─── ScanSource ───────────────────────────────────────────────────────────────
/// Any component that can list labelled training scans.
///
/// Implementations:
///   - ImageFolderLoader → one sub-directory per class
pub trait ScanSource {
    /// Class names in label-index order.
    fn class_names(&self) -> Result<Vec<String>>;

    /// Every labelled sample this source knows about.
    fn load_all(&self) -> Result<Vec<ScanSample>>;
}

// ─── ScanClassifier ───────────────────────────────────────────────────────────
/// Any component that turns an uploaded scan into a prediction.
///
/// Implementations:
///   - PredictUseCase → VGG16 classifier loaded from a checkpoint
pub trait ScanClassifier: Send + Sync {
    fn classify(&self, upload: &ScanUpload) -> Result<Prediction>;
}

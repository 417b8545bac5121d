// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Classifies one uploaded scan:
//   1. Pick the decoder (.dcm → DICOM, anything else → image)
//   2. Resize + normalise exactly as during training
//   3. Run the classifier, get softmax probabilities
//   4. Wrap them in a Prediction with the localised label
//
// The model file is resolved once, at construction:
//   explicit path → final checkpoint → newest epoch checkpoint
//   → download from the configured URL into the final path

use anyhow::{Context, Result};
use burn::prelude::*;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::data::{dicom::decode_dicom, preprocessor::ImagePreprocessor};
use crate::domain::{
    prediction::{Prediction, ScanUpload},
    traits::ScanClassifier,
};
use crate::infra::{checkpoint::CheckpointManager, fetch::ensure_model};
use crate::ml::inferencer::Inferencer;

pub struct PredictUseCase<B: Backend> {
    // burn modules are Send but not Sync; one request runs the model at a time
    inferencer: Mutex<Inferencer<B>>,
}

impl<B: Backend> PredictUseCase<B> {
    pub fn new(
        checkpoint_dir: impl Into<PathBuf>,
        model:          Option<PathBuf>,
        model_url:      Option<String>,
        device:         B::Device,
    ) -> Result<Self> {
        let ckpt = CheckpointManager::new(checkpoint_dir);

        let model_path = match model {
            Some(path) => path,
            None => ckpt
                .resolve_serving_model()?
                .unwrap_or_else(|| ckpt.final_path()),
        };
        ensure_model(&model_path, model_url.as_deref())?;
        tracing::info!("Loading model from '{}'", model_path.display());

        let inferencer = Inferencer::from_checkpoint(&ckpt, &model_path, device)?;
        Ok(Self::from_inferencer(inferencer))
    }

    pub fn from_inferencer(inferencer: Inferencer<B>) -> Self {
        Self { inferencer: Mutex::new(inferencer) }
    }

    pub fn predict(&self, upload: &ScanUpload) -> Result<Prediction> {
        let inferencer = self
            .inferencer
            .lock()
            .map_err(|_| anyhow::anyhow!("Inference engine is poisoned by an earlier panic"))?;

        // ── Step 1: Decode ────────────────────────────────────────────────────
        let image = if upload.is_dicom() {
            decode_dicom(&upload.bytes)?
        } else {
            ImagePreprocessor::decode(&upload.bytes)?
        };

        // ── Step 2: Preprocess ────────────────────────────────────────────────
        let pixels = inferencer.preprocessor().to_pixels(&image);

        // ── Step 3: Classify ──────────────────────────────────────────────────
        let probs = inferencer.probabilities(&pixels)?;

        // ── Step 4: Build the response ────────────────────────────────────────
        let prediction = Prediction::from_probabilities(inferencer.class_names(), &probs)
            .context("Cannot build prediction")?;

        tracing::info!(
            "Predicted {} (p={:.3}) for {}",
            prediction.label,
            prediction.prob,
            upload.filename.as_deref().unwrap_or("<unnamed>")
        );
        Ok(prediction)
    }
}

impl<B: Backend> ScanClassifier for PredictUseCase<B> {
    fn classify(&self, upload: &ScanUpload) -> Result<Prediction> {
        self.predict(upload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::{Normalization, UndecodableScan};
    use crate::domain::severity::DementiaClass;
    use crate::infra::checkpoint::ModelManifest;
    use crate::ml::{
        backbone::Vgg16FeaturesConfig,
        model::{AlzClassifier, AlzClassifierConfig},
    };
    use burn::backend::NdArray;
    use image::{ImageFormat, Luma, GrayImage};
    use std::io::Cursor;

    type B = NdArray;

    fn tiny_manifest() -> ModelManifest {
        ModelManifest {
            class_names:   DementiaClass::default_class_names(),
            normalization: Normalization::Caffe,
            model: AlzClassifierConfig::new(
                4,
                32,
                Vgg16FeaturesConfig::new(vec![vec![2], vec![2], vec![2], vec![2], vec![2]]),
            )
            .with_hidden_units(4),
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = GrayImage::from_pixel(20, 16, Luma([120]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn use_case() -> PredictUseCase<B> {
        let device   = Default::default();
        let manifest = tiny_manifest();
        let model: AlzClassifier<B> = manifest.model.init(&device);
        PredictUseCase::from_inferencer(Inferencer::from_parts(model, manifest, device).unwrap())
    }

    #[test]
    fn test_predict_png_upload() {
        let upload = ScanUpload::new(Some("scan.png".into()), png_bytes());
        let p = use_case().classify(&upload).unwrap();

        assert_eq!(p.probs.len(), 4);
        assert!(DementiaClass::from_label(&p.label).is_some());
        assert!((p.probs.values().sum::<f64>() - 1.0).abs() < 1e-3);
        assert_eq!(p.prob, p.probs[&p.label]);
    }

    #[test]
    fn test_garbage_upload_is_undecodable() {
        let upload = ScanUpload::new(Some("scan.jpg".into()), b"not an image".to_vec());
        let err = use_case().predict(&upload).unwrap_err();
        assert!(err.downcast_ref::<UndecodableScan>().is_some());
    }

    #[test]
    fn test_bad_dicom_is_undecodable() {
        let upload = ScanUpload::new(Some("scan.DCM".into()), png_bytes());
        let err = use_case().predict(&upload).unwrap_err();
        assert!(err.downcast_ref::<UndecodableScan>().is_some());
    }

    #[test]
    fn test_loads_final_checkpoint_from_dir() {
        let device = Default::default();
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());

        let manifest = tiny_manifest();
        ckpt.save_manifest(&manifest).unwrap();
        let model: AlzClassifier<B> = manifest.model.init(&device);
        ckpt.save_final(&model).unwrap();

        let uc = PredictUseCase::<B>::new(tmp.path(), None, None, device).unwrap();
        let upload = ScanUpload::new(None, png_bytes());
        assert!(uc.predict(&upload).is_ok());
    }

    #[test]
    fn test_missing_model_without_url_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(PredictUseCase::<B>::new(tmp.path(), None, None, Default::default()).is_err());
    }
}

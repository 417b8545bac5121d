// ============================================================
// Layer 5 — Inferencer
// ============================================================
use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::path::Path;

use crate::data::preprocessor::{ImagePreprocessor, Normalization};
use crate::domain::severity::DementiaClass;
use crate::infra::checkpoint::{CheckpointManager, ModelManifest};
use crate::ml::model::{AlzClassifier, AlzClassifierConfig};

pub type InferBackend = burn::backend::Wgpu;

pub struct Inferencer<B: Backend> {
    model:        AlzClassifier<B>,
    class_names:  Vec<String>,
    preprocessor: ImagePreprocessor,
    device:       B::Device,
}

impl<B: Backend> Inferencer<B> {
    /// Rebuild the network described by the manifest in `ckpt_manager`'s
    /// directory and load the weights at `model_path`.
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        model_path:   &Path,
        device:       B::Device,
    ) -> Result<Self> {
        let manifest = match ckpt_manager.load_manifest()? {
            Some(m) => m,
            None => {
                tracing::warn!(
                    "No model manifest in '{}'; assuming VGG16 on 224x224, torch normalisation and the four default classes",
                    ckpt_manager.dir().display()
                );
                default_manifest()
            }
        };

        let model: AlzClassifier<B> = manifest.model.init(&device);
        let model = ckpt_manager
            .load_model(model, model_path, &device)
            .with_context(|| format!("Cannot restore model '{}'", model_path.display()))?;

        Self::from_parts(model, manifest, device)
    }

    /// Wrap an already loaded model.
    pub fn from_parts(model: AlzClassifier<B>, manifest: ModelManifest, device: B::Device) -> Result<Self> {
        if manifest.class_names.len() != manifest.model.num_classes {
            bail!(
                "Manifest lists {} classes but the model has {} outputs",
                manifest.class_names.len(),
                manifest.model.num_classes
            );
        }

        let preprocessor =
            ImagePreprocessor::new(manifest.model.image_size as u32, manifest.normalization);

        tracing::info!(
            "Model ready: {} classes, {}x{} input",
            manifest.class_names.len(),
            manifest.model.image_size,
            manifest.model.image_size
        );

        Ok(Self {
            model,
            class_names: manifest.class_names,
            preprocessor,
            device,
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Class probabilities for one preprocessed `[3, H, W]` image.
    pub fn probabilities(&self, pixels: &[f32]) -> Result<Vec<f32>> {
        let expected = self.preprocessor.pixel_count();
        if pixels.len() != expected {
            bail!("Expected {} pixel values, got {}", expected, pixels.len());
        }

        let size   = self.preprocessor.image_size as usize;
        let images = Tensor::<B, 1>::from_floats(pixels, &self.device).reshape([1, 3, size, size]);

        let probs = self
            .model
            .probabilities(images)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read model output: {e:?}"))?;

        tracing::debug!("Probabilities: {:?}", probs);
        Ok(probs)
    }
}

/// Manifest used for checkpoints saved without one.
pub fn default_manifest() -> ModelManifest {
    let class_names = DementiaClass::default_class_names();
    ModelManifest {
        model:         AlzClassifierConfig::vgg16(class_names.len()),
        class_names,
        normalization: Normalization::Torch,
    }
}

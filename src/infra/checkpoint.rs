// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's NamedMpkGzFileRecorder
// (MessagePack + gzip) at full precision, so a resumed run continues
// from exactly the weights it stopped at.
//
// File naming convention:
//   checkpoints/
//     alz_vgg16_epoch1.mpk.gz   ← weights after epoch 1
//     alz_vgg16_epoch2.mpk.gz   ← weights after epoch 2
//     ...
//     alz_vgg16_final.mpk.gz    ← weights after the last planned epoch
//     model_manifest.json       ← everything needed to rebuild the
//                                 network: class names, input size,
//                                 normalisation, head config
//
// Resumption picks the NEWEST epoch file by modification time
// (ties broken by the higher epoch number). The epoch number is
// parsed from the file name.

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::data::preprocessor::Normalization;
use crate::ml::model::{AlzClassifier, AlzClassifierConfig};

pub const EPOCH_PREFIX:     &str = "alz_vgg16_epoch";
pub const FINAL_STEM:       &str = "alz_vgg16_final";
pub const RECORD_EXTENSION: &str = "mpk.gz";
pub const MANIFEST_FILE:    &str = "model_manifest.json";

type CheckpointRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

/// What a checkpoint needs next to it to be usable for inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Class names in label-index order
    pub class_names:   Vec<String>,
    pub normalization: Normalization,
    pub model:         AlzClassifierConfig,
}

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager.
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Cannot create checkpoint directory '{}': {}", dir.display(), e);
        }
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the checkpoint file for `epoch`.
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("{EPOCH_PREFIX}{epoch}.{RECORD_EXTENSION}"))
    }

    /// Full path of the final model file.
    pub fn final_path(&self) -> PathBuf {
        self.dir.join(format!("{FINAL_STEM}.{RECORD_EXTENSION}"))
    }

    /// Save model weights after `epoch`. Returns the written file path.
    pub fn save_epoch<B: Backend>(&self, model: &AlzClassifier<B>, epoch: usize) -> Result<PathBuf> {
        let path = self.epoch_path(epoch);
        self.save_record(model, &path)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(path)
    }

    /// Save the final model. Returns the written file path.
    pub fn save_final<B: Backend>(&self, model: &AlzClassifier<B>) -> Result<PathBuf> {
        let path = self.final_path();
        self.save_record(model, &path)?;
        tracing::info!("Model saved: {}", path.display());
        Ok(path)
    }

    fn save_record<B: Backend>(&self, model: &AlzClassifier<B>, path: &Path) -> Result<()> {
        // The recorder appends the extension itself
        let stem = record_stem(path);
        CheckpointRecorder::new()
            .record(model.clone().into_record(), stem)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        Ok(())
    }

    /// Load weights from `path` (with or without the `.mpk.gz` suffix)
    /// into a model of the matching architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  AlzClassifier<B>,
        path:   &Path,
        device: &B::Device,
    ) -> Result<AlzClassifier<B>> {
        let stem = record_stem(path);
        tracing::info!("Loading checkpoint '{}'", path.display());

        let record = CheckpointRecorder::new()
            .load(stem, device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Does it match the model manifest?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    /// Newest `alz_vgg16_epoch<N>.mpk.gz` file and its epoch number,
    /// or `None` when no epoch checkpoint exists.
    pub fn find_last_checkpoint(&self) -> Result<Option<(PathBuf, usize)>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        let mut best: Option<(SystemTime, usize, PathBuf)> = None;

        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let entry = entry?;
            let name  = entry.file_name();
            let Some(epoch) = name.to_str().and_then(parse_epoch) else {
                continue;
            };
            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let newer = match &best {
                None => true,
                Some((t, e, _)) => (modified, epoch) > (*t, *e),
            };
            if newer {
                best = Some((modified, epoch, entry.path()));
            }
        }

        Ok(best.map(|(_, epoch, path)| (path, epoch)))
    }

    /// The model to serve when none is given explicitly:
    /// the final model if present, else the newest epoch checkpoint.
    pub fn resolve_serving_model(&self) -> Result<Option<PathBuf>> {
        let final_path = self.final_path();
        if final_path.is_file() {
            return Ok(Some(final_path));
        }
        Ok(self.find_last_checkpoint()?.map(|(path, _)| path))
    }

    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let path = self.dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(manifest)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write manifest to '{}'", path.display()))?;

        tracing::debug!("Saved model manifest to '{}'", path.display());
        Ok(())
    }

    /// Load the manifest, or `None` if this directory has none yet.
    pub fn load_manifest(&self) -> Result<Option<ModelManifest>> {
        let path = self.dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read manifest from '{}'", path.display()))?;
        let manifest = serde_json::from_str(&json)
            .with_context(|| format!("Malformed manifest '{}'", path.display()))?;
        Ok(Some(manifest))
    }

    /// Fail when the classes found on disk differ from the checkpoint's.
    pub fn check_classes(manifest: &ModelManifest, found: &[String]) -> Result<()> {
        if manifest.class_names != found {
            bail!(
                "Checkpoint was trained on classes {:?} but the training directory has {:?}",
                manifest.class_names,
                found
            );
        }
        Ok(())
    }
}

/// Epoch number of a checkpoint file name, e.g.
/// `alz_vgg16_epoch12.mpk.gz` → 12.
pub fn parse_epoch(file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix(EPOCH_PREFIX)?
        .strip_suffix(RECORD_EXTENSION)?
        .strip_suffix('.')?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Path without the `.mpk.gz` suffix, which the recorder re-appends.
pub fn record_stem(path: &Path) -> PathBuf {
    let suffix = format!(".{RECORD_EXTENSION}");
    match path.to_str().and_then(|s| s.strip_suffix(suffix.as_str())) {
        Some(stem) => PathBuf::from(stem),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::backbone::Vgg16FeaturesConfig;
    use burn::backend::NdArray;
    use std::time::Duration;

    type B = NdArray;

    fn tiny_config() -> AlzClassifierConfig {
        AlzClassifierConfig::new(
            2,
            32,
            Vgg16FeaturesConfig::new(vec![vec![2], vec![2], vec![2], vec![2], vec![2]]),
        )
        .with_hidden_units(4)
    }

    #[test]
    fn test_parse_epoch() {
        assert_eq!(parse_epoch("alz_vgg16_epoch1.mpk.gz"), Some(1));
        assert_eq!(parse_epoch("alz_vgg16_epoch15.mpk.gz"), Some(15));
        assert_eq!(parse_epoch("alz_vgg16_final.mpk.gz"), None);
        assert_eq!(parse_epoch("alz_vgg16_epoch.mpk.gz"), None);
        assert_eq!(parse_epoch("alz_vgg16_epoch3.h5"), None);
        assert_eq!(parse_epoch("alz_vgg16_epoch3x.mpk.gz"), None);
    }

    #[test]
    fn test_record_stem() {
        assert_eq!(
            record_stem(Path::new("models/alz_vgg16_epoch5.mpk.gz")),
            PathBuf::from("models/alz_vgg16_epoch5")
        );
        assert_eq!(
            record_stem(Path::new("models/alz_vgg16_epoch5")),
            PathBuf::from("models/alz_vgg16_epoch5")
        );
    }

    #[test]
    fn test_no_checkpoint_in_empty_dir() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        assert!(ckpt.find_last_checkpoint().unwrap().is_none());
        assert!(ckpt.resolve_serving_model().unwrap().is_none());
    }

    #[test]
    fn test_newest_by_mtime_wins() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());

        fs::write(ckpt.epoch_path(12), b"x").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        // written later, lower number: still the newest
        fs::write(ckpt.epoch_path(3), b"x").unwrap();
        fs::write(ckpt.final_path(), b"x").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let (path, epoch) = ckpt.find_last_checkpoint().unwrap().unwrap();
        assert_eq!(epoch, 3);
        assert_eq!(path, ckpt.epoch_path(3));
    }

    #[test]
    fn test_serving_prefers_final() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        fs::write(ckpt.epoch_path(2), b"x").unwrap();
        assert_eq!(ckpt.resolve_serving_model().unwrap(), Some(ckpt.epoch_path(2)));

        fs::write(ckpt.final_path(), b"x").unwrap();
        assert_eq!(ckpt.resolve_serving_model().unwrap(), Some(ckpt.final_path()));
    }

    #[test]
    fn test_save_and_load_model() {
        let device = Default::default();
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());

        let model = tiny_config().init::<B>(&device);
        let path  = ckpt.save_epoch(&model, 4).unwrap();
        assert!(path.is_file(), "expected {} to exist", path.display());
        assert_eq!(ckpt.find_last_checkpoint().unwrap().unwrap().1, 4);

        let fresh  = tiny_config().init::<B>(&device);
        let loaded = ckpt.load_model(fresh, &path, &device).unwrap();
        assert_eq!(loaded.fc2.weight.dims(), model.fc2.weight.dims());
    }

    fn weights<B2: Backend>(model: &AlzClassifier<B2>) -> Vec<Vec<f32>> {
        vec![
            model.fc1.weight.val().into_data().to_vec::<f32>().unwrap(),
            model.fc2.weight.val().into_data().to_vec::<f32>().unwrap(),
            model.backbone.blocks[4].convs[0].weight.val().into_data().to_vec::<f32>().unwrap(),
        ]
    }

    #[test]
    fn test_checkpoint_restores_weights_bit_exact() {
        let device = Default::default();
        let tmp    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());

        let model = tiny_config().init::<B>(&device);
        let path  = ckpt.save_epoch(&model, 1).unwrap();

        let loaded   = ckpt.load_model(tiny_config().init::<B>(&device), &path, &device).unwrap();
        let expected = weights(&model);
        let actual   = weights(&loaded);
        for (e, a) in expected.iter().zip(&actual) {
            assert_eq!(e.len(), a.len());
            for (x, y) in e.iter().zip(a) {
                assert_eq!(x.to_bits(), y.to_bits(), "weight changed on reload: {x} vs {y}");
            }
        }
    }

    #[test]
    fn test_manifest_roundtrip_and_class_check() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        assert!(ckpt.load_manifest().unwrap().is_none());

        let manifest = ModelManifest {
            class_names:   vec!["a".into(), "b".into()],
            normalization: Normalization::Caffe,
            model:         tiny_config(),
        };
        ckpt.save_manifest(&manifest).unwrap();

        let loaded = ckpt.load_manifest().unwrap().unwrap();
        assert_eq!(loaded.class_names, manifest.class_names);
        assert_eq!(loaded.model.image_size, 32);

        assert!(CheckpointManager::check_classes(&loaded, &["a".into(), "b".into()]).is_ok());
        assert!(CheckpointManager::check_classes(&loaded, &["a".into()]).is_err());
    }
}

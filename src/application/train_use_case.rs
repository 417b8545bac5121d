// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: List labelled scans          (Layer 4 - data)
//   Step 2: Seeded train/val split       (Layer 4 - data)
//   Step 3: Find the last checkpoint     (Layer 6 - infra)
//   Step 4: Build or restore the model   (Layer 5 - ml)
//   Step 5: Save the model manifest      (Layer 6 - infra)
//   Step 6: Plan the remaining stages
//   Step 7: Run the training stages      (Layer 5 - ml)
//   Step 8: Save the final model         (Layer 6 - infra)
//
// Epochs are numbered globally across both stages:
//
//   1 ..= W            warmup    (backbone frozen,  lr 1e-4)
//   W+1 ..= W+F        finetune  (top block open,   lr 1e-5)
//
// so a checkpoint number alone says which stage to resume.

use anyhow::{bail, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{
    loader::ImageFolderLoader,
    preprocessor::{ImagePreprocessor, Normalization},
    splitter::split_train_val,
};
use crate::domain::traits::ScanSource;
use crate::infra::{
    checkpoint::{CheckpointManager, ModelManifest},
    fetch::ensure_model,
    metrics::MetricsLogger,
};
use crate::ml::{
    backbone::{vgg16_layout, Vgg16FeaturesConfig, VGG16_IMAGENET_FILE, VGG16_IMAGENET_URL},
    model::{AlzClassifier, AlzClassifierConfig},
    trainer::{train_stages, Stage, StagePlan, TrainBackend, TrainingSets},
};

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_dir:        String,
    pub checkpoint_dir:   String,
    pub image_size:       usize,
    pub batch_size:       usize,
    pub seed:             u64,
    pub validation_split: f64,
    pub warmup_epochs:    usize,
    pub finetune_epochs:  usize,
    pub warmup_lr:        f64,
    pub finetune_lr:      f64,
    pub hidden_units:     usize,
    pub dropout:          f64,
    /// Backbone blocks (counted from the top) opened during fine-tuning
    pub trainable_top_blocks: usize,
    /// Start fresh runs from ImageNet weights instead of random init
    pub pretrained:       bool,
    /// Pretrained backbone file (.safetensors or Burn record);
    /// defaults to the ImageNet cache in the checkpoint directory
    pub backbone_weights: Option<String>,
    /// Where to fetch the backbone file when it is missing
    pub backbone_url:     Option<String>,
    pub normalization:    Normalization,
    pub num_workers:      usize,
    /// Conv channel layout of the backbone, grouped per block
    pub backbone_layout:  Vec<Vec<usize>>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_dir:            "train".to_string(),
            checkpoint_dir:       ".".to_string(),
            image_size:           224,
            batch_size:           16,
            seed:                 42,
            validation_split:     0.2,
            warmup_epochs:        5,
            finetune_epochs:      15,
            warmup_lr:            1e-4,
            finetune_lr:          1e-5,
            hidden_units:         256,
            dropout:              0.5,
            trainable_top_blocks: 1,
            pretrained:           true,
            backbone_weights:     None,
            backbone_url:         Some(VGG16_IMAGENET_URL.to_string()),
            normalization:        Normalization::Torch,
            num_workers:          2,
            backbone_layout:      vgg16_layout(),
        }
    }
}

impl TrainConfig {
    pub fn total_epochs(&self) -> usize {
        self.warmup_epochs + self.finetune_epochs
    }

    /// Reject settings the network or the data loader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backbone_layout.is_empty() || self.backbone_layout.iter().any(Vec::is_empty) {
            bail!("Backbone layout needs at least one conv in every block");
        }
        // every block halves the side; the last one must still see 2x2
        let min_size = 1usize << self.backbone_layout.len();
        if self.image_size < min_size {
            bail!(
                "image_size {} is too small for {} pooling blocks (minimum {})",
                self.image_size,
                self.backbone_layout.len(),
                min_size
            );
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            bail!("validation_split must be in [0, 1), got {}", self.validation_split);
        }
        Ok(())
    }

    fn backbone_path(&self) -> PathBuf {
        match &self.backbone_weights {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.checkpoint_dir).join(VGG16_IMAGENET_FILE),
        }
    }

    fn model_config(&self, num_classes: usize) -> AlzClassifierConfig {
        AlzClassifierConfig::new(
            num_classes,
            self.image_size,
            Vgg16FeaturesConfig::new(self.backbone_layout.clone()),
        )
        .with_hidden_units(self.hidden_units)
        .with_dropout(self.dropout)
    }
}

/// Remaining stages after `last_epoch` completed epochs (0 = fresh run).
pub fn plan_stages(cfg: &TrainConfig, last_epoch: usize) -> Vec<StagePlan> {
    let blocks    = cfg.backbone_layout.len();
    let warmup    = cfg.warmup_epochs;
    let total     = cfg.total_epochs();
    let mut plans = Vec::new();

    if last_epoch < warmup {
        plans.push(StagePlan {
            stage:         Stage::Warmup,
            first_epoch:   last_epoch + 1,
            last_epoch:    warmup,
            lr:            cfg.warmup_lr,
            frozen_blocks: blocks,
        });
    }

    if last_epoch < total && cfg.finetune_epochs > 0 {
        plans.push(StagePlan {
            stage:         Stage::FineTune,
            first_epoch:   last_epoch.max(warmup) + 1,
            last_epoch:    total,
            lr:            cfg.finetune_lr,
            frozen_blocks: blocks.saturating_sub(cfg.trainable_top_blocks),
        });
    }

    plans
}

/// What a training run did.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub resumed_from: Option<usize>,
    pub epochs_run:   usize,
    pub final_model:  PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline on the default WGPU device.
    pub fn execute(&self) -> Result<TrainReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TrainBackend>(&device)
    }

    /// Execute the full training pipeline on any autodiff backend.
    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainReport> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: List labelled scans ───────────────────────────────────────
        tracing::info!("TRAIN_DIR = {}", cfg.train_dir);
        let loader      = ImageFolderLoader::new(&cfg.train_dir);
        let class_names = loader.class_names()?;
        let samples     = loader.load_all()?;
        tracing::info!("Classes: {:?}", class_names);

        // ── Step 2: Seeded train / validation split ───────────────────────────
        let (train, valid) = split_train_val(samples, cfg.validation_split, cfg.seed);
        tracing::info!("Split: {} train, {} validation", train.len(), valid.len());

        // ── Step 3: Find the last checkpoint ──────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        let last = ckpt_manager.find_last_checkpoint()?;
        match &last {
            Some((path, epoch)) => {
                tracing::info!("Found checkpoint: {} (epoch {})", path.display(), epoch)
            }
            None => tracing::info!("No checkpoint found, starting from scratch"),
        }

        // ── Step 4: Build or restore the model ────────────────────────────────
        let (model, manifest) = match &last {
            Some((path, _)) => self.restore::<B>(&ckpt_manager, path, &class_names, device)?,
            None => self.build_fresh(&class_names, device)?,
        };

        // ── Step 5: Save the manifest for inference ───────────────────────────
        ckpt_manager.save_manifest(&manifest)?;

        // ── Step 6: Plan what is left to train ────────────────────────────────
        let last_epoch = last.as_ref().map(|(_, e)| *e).unwrap_or(0);
        let stages     = plan_stages(cfg, last_epoch);
        let epochs_run = stages.iter().map(StagePlan::epochs).sum();
        if stages.is_empty() {
            tracing::info!(
                "Checkpoint epoch {} already covers all {} planned epochs",
                last_epoch,
                cfg.total_epochs()
            );
        }

        // ── Step 7: Run the training stages (Layer 5) ─────────────────────────
        let preprocessor =
            ImagePreprocessor::new(manifest.model.image_size as u32, manifest.normalization);
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
        tracing::info!("Appending metrics to '{}'", metrics.csv_path().display());
        let model = train_stages(
            model,
            &stages,
            TrainingSets { train, valid },
            preprocessor,
            cfg,
            &ckpt_manager,
            &metrics,
            device,
        )?;

        // ── Step 8: Save the final model ──────────────────────────────────────
        let final_model = ckpt_manager.save_final(&model)?;

        Ok(TrainReport {
            resumed_from: last.map(|(_, e)| e),
            epochs_run,
            final_model,
        })
    }

    fn build_fresh<B: AutodiffBackend>(
        &self,
        class_names: &[String],
        device:      &B::Device,
    ) -> Result<(AlzClassifier<B>, ModelManifest)> {
        let cfg          = &self.config;
        let model_config = cfg.model_config(class_names.len());
        let mut model: AlzClassifier<B> = model_config.init(device);

        if cfg.pretrained {
            let weights = cfg.backbone_path();
            ensure_model(&weights, cfg.backbone_url.as_deref())?;
            model.backbone = model.backbone.load_pretrained(&weights, device)?;
        } else {
            tracing::warn!("Pretrained weights disabled; the backbone starts from random init");
        }

        let manifest = ModelManifest {
            class_names:   class_names.to_vec(),
            normalization: cfg.normalization,
            model:         model_config,
        };
        Ok((model, manifest))
    }

    fn restore<B: AutodiffBackend>(
        &self,
        ckpt_manager: &CheckpointManager,
        path:         &Path,
        class_names:  &[String],
        device:       &B::Device,
    ) -> Result<(AlzClassifier<B>, ModelManifest)> {
        // The manifest describes the architecture the checkpoint was
        // saved with; without one, assume the current config.
        let manifest = match ckpt_manager.load_manifest()? {
            Some(manifest) => {
                CheckpointManager::check_classes(&manifest, class_names)?;
                manifest
            }
            None => ModelManifest {
                class_names:   class_names.to_vec(),
                normalization: self.config.normalization,
                model:         self.config.model_config(class_names.len()),
            },
        };

        tracing::info!("Restoring model from checkpoint and continuing training");
        let model: AlzClassifier<B> = manifest.model.init(device);
        let model = ckpt_manager.load_model(model, path, device)?;
        Ok((model, manifest))
    }
}

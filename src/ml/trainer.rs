// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Runs the planned training stages over one pair of data loaders:
//
//   Stage 1 (warmup):   backbone frozen, only the head learns
//   Stage 2 (finetune): top backbone block unfrozen, lower lr
//
// Each stage gets a fresh Adam optimiser. After every epoch:
//   - train / validation loss and accuracy are printed
//   - the model is saved as alz_vgg16_epoch{N}
//   - a metrics row is appended to metrics.csv
//
// Key Burn insight:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on the inner backend,
//     so the validation loader is built for that backend
//   - Frozen blocks are implemented by detaching activations;
//     parameters without gradients are skipped by Adam

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::ScanBatcher,
    dataset::{ScanDataset, ScanSample},
    preprocessor::ImagePreprocessor,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{count_correct, AlzClassifier};

pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Which phase of transfer learning an epoch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Warmup,
    FineTune,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Warmup   => "warmup",
            Stage::FineTune => "finetune",
        }
    }
}

/// A contiguous run of epochs with one learning rate and freeze setting.
/// Epoch numbers are global and 1-based, inclusive on both ends.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub stage:         Stage,
    pub first_epoch:   usize,
    pub last_epoch:    usize,
    pub lr:            f64,
    pub frozen_blocks: usize,
}

impl StagePlan {
    pub fn epochs(&self) -> usize {
        (self.last_epoch + 1).saturating_sub(self.first_epoch)
    }
}

pub struct TrainingSets {
    pub train: Vec<ScanSample>,
    pub valid: Vec<ScanSample>,
}

pub fn train_stages<B: AutodiffBackend>(
    mut model:    AlzClassifier<B>,
    stages:       &[StagePlan],
    sets:         TrainingSets,
    preprocessor: ImagePreprocessor,
    cfg:          &TrainConfig,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
    device:       &B::Device,
) -> Result<AlzClassifier<B>> {
    let batcher = ScanBatcher::new(preprocessor.image_size as usize);

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_loader = DataLoaderBuilder::<B, _, _>::new(batcher.clone())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .set_device(device.clone())
        .build(ScanDataset::new(sets.train, preprocessor));

    // ── Validation data loader (InnerBackend, no autodiff) ─────────────────────
    let val_loader = DataLoaderBuilder::<B::InnerBackend, _, _>::new(batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .set_device(device.clone())
        .build(ScanDataset::new(sets.valid, preprocessor));

    let total_epochs      = stages.last().map(|s| s.last_epoch).unwrap_or(0);
    let mut best_val_loss = f64::INFINITY;

    for plan in stages {
        println!(
            "\n=== {}: epochs {}..={} | lr={:e} | frozen blocks={} ===",
            plan.stage.name(),
            plan.first_epoch,
            plan.last_epoch,
            plan.lr,
            plan.frozen_blocks,
        );

        model = model.with_frozen_blocks(plan.frozen_blocks);

        let mut optim = AdamConfig::new().with_epsilon(1e-7).init();

        for epoch in plan.first_epoch..=plan.last_epoch {

            // ── Training phase ────────────────────────────────────────────────
            let mut train_loss_sum = 0.0f64;
            let mut train_correct  = 0usize;
            let mut train_seen     = 0usize;

            for batch in train_loader.iter() {
                let n = batch.targets.dims()[0];
                let (loss, logits) =
                    model.forward_classification(batch.images, batch.targets.clone());

                train_loss_sum += loss.clone().into_scalar().elem::<f64>() * n as f64;
                train_correct  += count_correct(logits, batch.targets);
                train_seen     += n;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(plan.lr, model, grads);
            }

            // ── Validation phase ──────────────────────────────────────────────
            // dropout disabled on the inner backend
            let model_valid = model.valid();

            let mut val_loss_sum = 0.0f64;
            let mut val_correct  = 0usize;
            let mut val_seen     = 0usize;

            for batch in val_loader.iter() {
                let n = batch.targets.dims()[0];
                let (loss, logits) =
                    model_valid.forward_classification(batch.images, batch.targets.clone());

                val_loss_sum += loss.into_scalar().elem::<f64>() * n as f64;
                val_correct  += count_correct(logits, batch.targets);
                val_seen     += n;
            }

            let row = EpochMetrics {
                epoch,
                stage:      plan.stage.name().to_string(),
                train_loss: mean(train_loss_sum, train_seen),
                train_acc:  ratio(train_correct, train_seen),
                val_loss:   mean(val_loss_sum, val_seen),
                val_acc:    ratio(val_correct, val_seen),
            };

            println!(
                "Epoch {:>3}/{} | loss={:.4} | accuracy={:.1}% | val_loss={:.4} | val_accuracy={:.1}%",
                epoch,
                total_epochs,
                row.train_loss,
                row.train_acc * 100.0,
                row.val_loss,
                row.val_acc * 100.0,
            );

            if row.is_improvement(best_val_loss) {
                tracing::info!("val_loss improved to {:.4}", row.val_loss);
                best_val_loss = row.val_loss;
            }

            let path = ckpt_manager.save_epoch(&model, epoch)?;
            metrics.log(&row)?;
            tracing::info!("Checkpoint saved: {}", path.display());
        }
    }

    Ok(model)
}

fn mean(sum: f64, count: usize) -> f64 {
    if count > 0 { sum / count as f64 } else { f64::NAN }
}

fn ratio(hits: usize, count: usize) -> f64 {
    if count > 0 { hits as f64 / count as f64 } else { 0.0 }
}

// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network code lives here.
//
//   backbone.rs   — VGG16 convolutional feature extractor,
//                   loadable from pretrained ImageNet weights
//
//   model.rs      — Classifier: backbone + dense head, with a
//                   configurable number of frozen backbone blocks
//
//   trainer.rs    — Two-stage epoch loop: forward pass, loss,
//                   backward pass, Adam step, per-epoch validation
//                   and checkpointing
//
//   inferencer.rs — Rebuilds the model from a checkpoint and
//                   returns class probabilities for one image

/// VGG16 convolutional backbone
pub mod backbone;

/// Transfer-learning classifier architecture
pub mod model;

/// Staged training loop with validation and checkpointing
pub mod trainer;

/// Inference engine: loads a checkpoint and predicts probabilities
pub mod inferencer;

// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from scan files on disk to tensor batches.
//
//   train/<class>/*.jpg
//       │
//       ▼
//   ImageFolderLoader → lists (path, label) samples, labels inferred
//       │                from sorted class folder names
//       ▼
//   split_train_val   → seeded 80/20 split
//       │
//       ▼
//   ScanDataset       → implements Burn's Dataset trait, decodes lazily
//       │               through ImagePreprocessor
//       ▼
//   ScanBatcher       → stacks samples into [N, 3, H, W] tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// DICOM uploads at inference time take a detour through `dicom`
// before reaching the same ImagePreprocessor.

/// Lists labelled scans from a class-per-folder directory
pub mod loader;

/// Decodes, resizes and normalises images for VGG16
pub mod preprocessor;

/// Converts DICOM uploads into ordinary RGB images
pub mod dicom;

/// Implements Burn's Dataset trait for scan samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;

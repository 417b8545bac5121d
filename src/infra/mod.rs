// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by more than one layer:
//
//   checkpoint.rs — epoch/final checkpoint files, resumption
//                   lookup, and the JSON model manifest
//
//   metrics.rs    — per-epoch metrics appended to a CSV file
//
//   fetch.rs      — one-time download of serving weights

/// Model checkpoint saving, loading and lookup
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Download of model weights for serving
pub mod fetch;

// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training or classifying a scan).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No HTTP or argument parsing here (Layer 1)
//   - No direct file formats here (Layers 4 and 6)
//   - Only workflow coordination

// The two-stage training workflow
pub mod train_use_case;

// The single-scan classification workflow
pub mod predict_use_case;

// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe what the system works with:
// the severity classes, a prediction, an uploaded scan, and
// the traits the outer layers program against.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O or network calls
//   - Only plain structs, enums, and traits

// The four dementia severity classes
pub mod severity;

// The result returned for one classified scan
pub mod prediction;

// Core abstractions (traits) that other layers implement
pub mod traits;

// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types shared by every other layer.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs and enums
//
// This keeps the core vocabulary of the system (a labelled
// face image, a dataset split) testable without tensors.

// A face image record with its continuous age label
pub mod sample;

pub use sample::{AgeRecord, Split};

// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the dataset manifest
// all the way to tensor batches.
//
// The pipeline flows in this order:
//
//   agedb.csv manifest
//       │
//       ▼
//   manifest      → parses (path, age, split) records
//       │
//       ▼
//   transforms    → per-split augmentation + normalization
//       │
//       ▼
//   AgeDataset    → implements Burn's Dataset trait,
//                   loads + transforms one image per get()
//       │
//       ▼
//   AgeBatcher    → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader    → feeds batches to the training loop
//
// Each module is responsible for exactly one step.

/// Parses the CSV manifest into AgeRecords
pub mod manifest;

/// Per-split image transform pipelines
pub mod transforms;

/// Implements Burn's Dataset trait for age samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

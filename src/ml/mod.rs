// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// No other layer builds models or computes gradients — only
// this one (the data layer shares Burn's dataset traits).
//
// What's in this layer:
//
//   model.rs    — The ResNet encoder + regression head
//                 resnet18 (basic blocks, 512-d features) and
//                 resnet50 (bottleneck blocks, 2048-d features),
//                 built from scratch with Burn's conv/bn/pool
//                 primitives. forward() returns both the scalar
//                 prediction and the pooled feature vector, so
//                 feature-space regularizers can use the latter.
//
//   loss.rs     — The selectable training criteria
//                 L1, FAR, FAR-EXP, ConR, ranksim, focal-l1,
//                 focal-mse. One closed enum, one exhaustive
//                 match — an unknown name dies at the CLI.
//
//   schedule.rs — Cosine learning rate annealing keyed on the
//                 epoch number, with the floor tied to the
//                 decay rate.
//
//   trainer.rs  — The training loop
//                 Forward, loss, backward, SGD step, progress
//                 meters, validation after every epoch, best and
//                 periodic snapshots, resume.

/// ResNet encoder and regression head
pub mod model;

/// Selectable training criteria and feature-space regularizers
pub mod loss;

/// Cosine learning rate annealing
pub mod schedule;

/// Full training loop with validation and checkpointing
pub mod trainer;

// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs — Training snapshot persistence
//                   Uniform {stem}.model.bin / {stem}.optim.bin /
//                   {stem}.meta.json schema via Burn's
//                   BinFileRecorder, so every snapshot (periodic
//                   or best) can be resumed from.
//
//   logging.rs    — tracing subscriber setup
//                   Stdout plus a per-run training.log file.
//
//   metrics.rs    — Regression statistics
//                   RunningMetric for streamed batch scalars and
//                   the split-level MAE/RMSE/Pearson/Spearman/R²
//                   bundle used for best-checkpoint tracking.
//
// Keeping these here prevents duplication across layers and
// keeps the data and ML layers focused on their core logic.

/// Training snapshot saving and loading
pub mod checkpoint;

/// tracing subscriber setup (stdout + per-run log file)
pub mod logging;

/// Running meters and split-level regression statistics
pub mod metrics;

// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a saved checkpoint on one dataset split:
//
//   Step 1: Load the manifest, keep the requested split
//   Step 2: Rebuild the model and load the checkpoint weights
//   Step 3: One pass over the split (deterministic transforms)
//   Step 4: Return MAE/RMSE/Pearson/Spearman/R²
//
// Runs entirely on the inference backend — no autodiff, no
// optimizer state needed.

use anyhow::{bail, Result};
use burn::data::dataloader::DataLoaderBuilder;

use crate::data::{
    batcher::AgeBatcher,
    dataset::AgeDataset,
    manifest::{load_records, split_records},
    transforms::TransformPipeline,
};
use crate::domain::Split;
use crate::infra::{checkpoint, logging, metrics::EvaluationResult};
use crate::ml::{
    model::{AgeModelConfig, DatasetKind, ModelKind},
    trainer::{evaluate_loader, InferBackend},
};

use std::path::PathBuf;

/// Everything the evaluate workflow needs, decoupled from clap.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub checkpoint:  PathBuf,
    pub data_folder: String,
    pub dataset:     DatasetKind,
    pub model:       ModelKind,
    pub split:       Split,
    pub batch_size:  usize,
    pub num_workers: usize,
}

pub struct EvaluateUseCase {
    config: EvalConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvalConfig) -> Result<Self> {
        logging::init_process_logging()?;
        Ok(Self { config })
    }

    /// Execute the evaluation workflow end to end.
    pub fn execute(&self) -> Result<EvaluationResult> {
        let cfg = &self.config;

        // ── Manifest → requested split ────────────────────────────────────────
        let records = load_records(&cfg.data_folder, cfg.dataset)?;
        let records = split_records(&records, cfg.split);
        if records.is_empty() {
            bail!("split '{}' has no samples in the manifest", cfg.split);
        }
        tracing::info!("Scoring {} samples from split '{}'", records.len(), cfg.split);

        // ── Rebuild model and load weights ────────────────────────────────────
        let device = burn::backend::ndarray::NdArrayDevice::default();
        let model  = AgeModelConfig::new(cfg.model, cfg.dataset.label_dim())
            .init::<InferBackend>(&device);
        let model = checkpoint::load_model::<InferBackend, _>(&cfg.checkpoint, model, &device)?;
        tracing::info!("Loaded checkpoint '{}'", cfg.checkpoint.display());

        // ── One evaluation pass ───────────────────────────────────────────────
        let dataset =
            AgeDataset::new(cfg.data_folder.as_str(), records, TransformPipeline::for_eval());
        let batcher = AgeBatcher::<InferBackend>::new(device);
        let loader  = DataLoaderBuilder::new(batcher)
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .build(dataset);

        evaluate_loader(&loader, |images| model.forward(images).0)
    }
}

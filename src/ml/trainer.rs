// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + validation loop using Burn's DataLoader and SGD.
//
// Backend split:
//   - Training uses TrainBackend (Autodiff<NdArray>) for gradients
//   - model.valid() returns the model on InferBackend (NdArray)
//   - Validation/test batchers must also use InferBackend
//
// Per epoch:
//   1. anneal the learning rate (cosine, keyed on the epoch)
//   2. one pass over the train loader: forward, loss, backward,
//      SGD step — with a progress line every `print_freq` batches
//   3. full validation pass → MAE/RMSE/Pearson/Spearman/R²
//   4. STRICT MAE improvement → save `best` snapshot and score
//      the test split with the same weights
//   5. every `save_freq` epochs → save a periodic snapshot
//
// Resuming restores model + optimizer + best_error from any
// snapshot and continues at the epoch after it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
};

use crate::application::train_use_case::RunConfig;
use crate::data::{batcher::{AgeBatch, AgeBatcher}, dataset::AgeDataset};
use crate::infra::checkpoint::{self, CheckpointManager, SnapshotMeta};
use crate::infra::metrics::{EvaluationResult, RunningMetric};
use crate::ml::{loss, model::AgeModelConfig, schedule::annealed_lr};

pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;
pub type InferBackend = burn::backend::NdArray;

/// Shuffle seed for the train loader, fixed so two runs with the
/// same config see the same batch order.
const SHUFFLE_SEED: u64 = 42;

/// Baseline for best-MAE tracking on a fresh run.
const INITIAL_BEST_ERROR: f64 = 1e10;

pub fn run_training(
    cfg:           &RunConfig,
    train_dataset: AgeDataset,
    val_dataset:   AgeDataset,
    test_dataset:  AgeDataset,
    ckpt_manager:  CheckpointManager,
) -> Result<()> {
    let device = burn::backend::ndarray::NdArrayDevice::default();
    tracing::info!("Using NdArray device: {:?}", device);

    let train_size    = train_dataset.sample_count();
    let train_batches = (train_size + cfg.batch_size - 1) / cfg.batch_size;

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = AgeModelConfig::new(cfg.model, cfg.dataset.label_dim());
    let mut model = model_cfg.init::<TrainBackend>(&device);
    tracing::info!(
        "Model ready: {} ({}-d features, {} output)",
        cfg.model,
        cfg.model.feat_dim(),
        cfg.dataset.label_dim(),
    );

    // ── SGD optimiser ─────────────────────────────────────────────────────────
    // v = momentum*v + g            (velocity)
    // θ = θ - lr*v                  (update)
    // with decoupled L2 weight decay on g.
    let optim_cfg = SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(cfg.momentum)
                .with_dampening(0.0),
        ))
        .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay)));
    let mut optim = optim_cfg.init();

    // ── Resume ────────────────────────────────────────────────────────────────
    let mut start_epoch = 1;
    let mut best_error  = INITIAL_BEST_ERROR;
    if let Some(meta_path) = &cfg.resume {
        let (m, o, meta) =
            checkpoint::resume_training::<TrainBackend, _, _>(meta_path, model, optim, &device)?;
        model       = m;
        optim       = o;
        start_epoch = meta.epoch + 1;
        best_error  = meta.best_error;
        tracing::info!(
            "Resumed from '{}' — continuing at epoch {start_epoch} (best MAE so far {best_error:.3})",
            meta_path.display(),
        );
    }

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = AgeBatcher::<TrainBackend>::new(device.clone());
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(SHUFFLE_SEED)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Val/test loaders (InnerBackend — no autodiff overhead) ────────────────
    let val_batcher = AgeBatcher::<InferBackend>::new(device.clone());
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let test_batcher = AgeBatcher::<InferBackend>::new(device.clone());
    let test_loader  = DataLoaderBuilder::new(test_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(test_dataset);

    let mut best_test: Option<EvaluationResult> = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in start_epoch..=cfg.epochs {
        let lr = annealed_lr(cfg.learning_rate, cfg.lr_decay_rate, epoch, cfg.epochs);

        // ── Training phase ────────────────────────────────────────────────────
        let mut batch_time = RunningMetric::new();
        let mut data_time  = RunningMetric::new();
        let mut losses     = RunningMetric::new();
        let mut end        = Instant::now();

        for (idx, batch) in train_loader.iter().enumerate() {
            data_time.update(end.elapsed().as_secs_f64(), 1);
            let n = batch.images.dims()[0];

            let (output, feat) = model.forward(batch.images);
            let batch_loss = loss::compute(cfg.loss, cfg.alpha, output, batch.labels, feat);
            losses.update(batch_loss.clone().into_scalar().elem::<f64>(), n);

            // Backward pass + SGD update
            let grads = batch_loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);

            batch_time.update(end.elapsed().as_secs_f64(), 1);
            end = Instant::now();

            if (idx + 1) % cfg.print_freq == 0 {
                tracing::info!(
                    "Train: [{epoch}][{}/{train_batches}] \
                     BT {:.3} ({:.3}) DT {:.3} ({:.3}) loss {:.4} ({:.4}) lr {lr:.6}",
                    idx + 1,
                    batch_time.val(), batch_time.avg(),
                    data_time.val(),  data_time.avg(),
                    losses.val(),     losses.avg(),
                );
            }
        }

        tracing::info!("Epoch {epoch}/{}: train loss {:.4}", cfg.epochs, losses.avg());

        // ── Validation + test phase ───────────────────────────────────────────
        // model.valid() → AgeModel<InferBackend>; gradients off.
        let model_valid = model.valid();
        let val_result  = evaluate_loader(&val_loader, |images| model_valid.forward(images).0)?;
        let test_result = evaluate_loader(&test_loader, |images| model_valid.forward(images).0)?;
        tracing::info!("Val:  {val_result}");
        tracing::info!("Test: {test_result}");

        // ── Best checkpoint (strict MAE improvement only) ─────────────────────
        if val_result.is_improvement(best_error) {
            best_error = val_result.mae;
            best_test  = Some(test_result);

            let meta = SnapshotMeta { epoch, best_error };
            ckpt_manager.save_snapshot("best", &model, &optim, &meta)?;
            tracing::info!("New best model at epoch {epoch} (val MAE {best_error:.3})");
        }

        // ── Periodic checkpoint ───────────────────────────────────────────────
        if epoch % cfg.save_freq == 0 {
            let meta = SnapshotMeta { epoch, best_error };
            ckpt_manager.save_snapshot(&format!("ckpt_epoch_{epoch}"), &model, &optim, &meta)?;
        }
    }

    tracing::info!("Training complete. Best val MAE: {best_error:.3}");
    if let Some(test_result) = best_test {
        tracing::info!("Test at best val: {test_result}");
    }
    Ok(())
}

/// One full pass over a loader: run `forward` on every batch,
/// concatenate predictions and labels, compute split statistics.
/// Shared by the validation phase and the evaluate command.
pub fn evaluate_loader<B, F>(
    loader:  &Arc<dyn DataLoader<AgeBatch<B>>>,
    forward: F,
) -> Result<EvaluationResult>
where
    B: Backend,
    F: Fn(Tensor<B, 4>) -> Tensor<B, 2>,
{
    let mut preds:  Vec<f32> = Vec::new();
    let mut truths: Vec<f32> = Vec::new();

    for batch in loader.iter() {
        let output = forward(batch.images);
        let mut batch_preds = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("cannot read predictions off the backend: {e:?}"))?;
        let mut batch_truths = batch
            .labels
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("cannot read labels off the backend: {e:?}"))?;
        preds.append(&mut batch_preds);
        truths.append(&mut batch_truths);
    }

    if preds.is_empty() {
        bail!("evaluation split produced no samples");
    }
    Ok(EvaluationResult::compute(&preds, &truths))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transforms::TransformPipeline;
    use crate::domain::{AgeRecord, Split};
    use crate::ml::model::ModelKind;
    use std::fs;

    /// Tiny on-disk dataset: two solid-colour PNGs with known ages.
    fn tiny_dataset(root: &std::path::Path) -> AgeDataset {
        let mut records = Vec::new();
        for (name, age, lum) in [("a.png", 20.0f32, 40u8), ("b.png", 60.0, 200)] {
            let img = image::RgbImage::from_pixel(8, 8, image::Rgb([lum, lum, lum]));
            img.save(root.join(name)).unwrap();
            records.push(AgeRecord {
                path:  name.to_string(),
                age,
                split: Split::Test,
            });
        }
        AgeDataset::new(root, records, TransformPipeline::for_eval())
    }

    #[test]
    fn test_evaluate_loader_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        let dataset = tiny_dataset(dir.path());

        let device  = burn::backend::ndarray::NdArrayDevice::default();
        let model   = AgeModelConfig::new(ModelKind::ResNet18, 1).init::<InferBackend>(&device);
        let batcher = AgeBatcher::<InferBackend>::new(device);
        let loader  = DataLoaderBuilder::new(batcher).batch_size(2).build(dataset);

        let result = evaluate_loader(&loader, |images| model.forward(images).0).unwrap();
        assert!(result.mae.is_finite());
        assert!(result.rmse >= result.mae);
    }
}

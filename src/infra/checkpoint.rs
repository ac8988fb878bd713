// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores training snapshots. ONE uniform schema is
// used for both periodic and best checkpoints, so any snapshot
// is resumable:
//
//   {stem}.model.bin  — model parameters (Burn BinFileRecorder,
//                       full precision so a resumed run is
//                       bit-compatible with an uninterrupted one)
//   {stem}.optim.bin  — optimizer state (momentum buffers)
//   {stem}.meta.json  — { epoch, best_error }
//
// File naming convention inside the run folder:
//   save/AgeDB_models/<run_name>/
//     ckpt_epoch_100.model.bin  ← periodic snapshot (every save_freq)
//     ckpt_epoch_100.optim.bin
//     ckpt_epoch_100.meta.json
//     best.model.bin            ← best validation MAE so far
//     best.optim.bin
//     best.meta.json
//
// A missing or malformed snapshot file on resume is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::{
    module::{AutodiffModule, Module},
    optim::Optimizer,
    record::{BinFileRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};

type SnapshotRecorder = BinFileRecorder<FullPrecisionSettings>;

const META_SUFFIX: &str = ".meta.json";

/// Scalar bookkeeping persisted next to the tensor records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Epoch the snapshot was taken at; resume continues at epoch + 1
    pub epoch: usize,

    /// Best validation MAE observed so far in the run
    pub best_error: f64,
}

/// Manages saving of snapshots inside one run folder.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager rooted at `dir`, creating the directory
    /// (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create checkpoint folder '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the meta file for a snapshot stem (what --resume takes).
    pub fn meta_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}{META_SUFFIX}"))
    }

    /// Persist a full snapshot (model + optimizer + meta) under `stem`.
    pub fn save_snapshot<B, M, O>(
        &self,
        stem:  &str,
        model: &M,
        optim: &O,
        meta:  &SnapshotMeta,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + Clone,
        O: Optimizer<M, B>,
    {
        let recorder = SnapshotRecorder::new();

        // Paths carry the .bin extension explicitly: the recorder runs
        // set_extension("bin") on whatever it is given, which would
        // otherwise strip the .model/.optim part and collapse both
        // records onto one file.
        let model_path = self.dir.join(format!("{stem}.model.bin"));
        recorder
            .record(model.clone().into_record(), model_path.clone())
            .with_context(|| format!("failed to save model to '{}'", model_path.display()))?;

        let optim_path = self.dir.join(format!("{stem}.optim.bin"));
        recorder
            .record(optim.to_record(), optim_path.clone())
            .with_context(|| format!("failed to save optimizer to '{}'", optim_path.display()))?;

        let meta_path = self.meta_path(stem);
        fs::write(&meta_path, serde_json::to_string_pretty(meta)?)
            .with_context(|| format!("failed to write '{}'", meta_path.display()))?;

        tracing::debug!("saved snapshot '{stem}' (epoch {})", meta.epoch);
        Ok(())
    }
}

/// Split a `--resume`/`--checkpoint` meta path into its folder and stem.
fn snapshot_stem(meta_path: &Path) -> Result<(PathBuf, String)> {
    let name = meta_path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid checkpoint path '{}'", meta_path.display()))?;
    let Some(stem) = name.strip_suffix(META_SUFFIX) else {
        bail!("checkpoint path '{name}' must end in '{META_SUFFIX}'");
    };
    let dir = meta_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    Ok((dir, stem.to_string()))
}

/// Read the scalar bookkeeping of a snapshot.
pub fn load_meta(meta_path: &Path) -> Result<SnapshotMeta> {
    let text = fs::read_to_string(meta_path)
        .with_context(|| format!("cannot read checkpoint meta '{}'", meta_path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("malformed checkpoint meta '{}'", meta_path.display()))
}

/// Restore model parameters from a snapshot into a freshly built model.
/// Works on any backend — this is all the evaluate path needs.
pub fn load_model<B, M>(meta_path: &Path, model: M, device: &B::Device) -> Result<M>
where
    B: Backend,
    M: Module<B>,
{
    let (dir, stem) = snapshot_stem(meta_path)?;
    let model_path = dir.join(format!("{stem}.model.bin"));
    let record: M::Record = SnapshotRecorder::new()
        .load(model_path.clone(), device)
        .with_context(|| format!("cannot load model record '{}'", model_path.display()))?;
    Ok(model.load_record(record))
}

/// Restore a full training snapshot: model parameters, optimizer state
/// and meta. The caller resumes at `meta.epoch + 1`.
pub fn resume_training<B, M, O>(
    meta_path: &Path,
    model:     M,
    optim:     O,
    device:    &B::Device,
) -> Result<(M, O, SnapshotMeta)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    let meta  = load_meta(meta_path)?;
    let model = load_model::<B, M>(meta_path, model, device)?;

    let (dir, stem) = snapshot_stem(meta_path)?;
    let optim_path = dir.join(format!("{stem}.optim.bin"));
    let record: O::Record = SnapshotRecorder::new()
        .load(optim_path.clone(), device)
        .with_context(|| format!("cannot load optimizer record '{}'", optim_path.display()))?;
    let optim = optim.load_record(record);

    Ok((model, optim, meta))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{AgeModel, AgeModelConfig, ModelKind};
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::SgdConfig;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_meta_path_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        assert!(manager
            .meta_path("best")
            .to_string_lossy()
            .ends_with("best.meta.json"));
    }

    #[test]
    fn test_snapshot_stem_rejects_foreign_files() {
        assert!(snapshot_stem(Path::new("run/best.meta.json")).is_ok());
        assert!(snapshot_stem(Path::new("run/best.model.bin")).is_err());
    }

    #[test]
    fn test_snapshot_writes_three_distinct_files() {
        // Model and optimizer records must not collapse onto one file.
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let model: AgeModel<TestBackend> =
            AgeModelConfig::new(ModelKind::ResNet18, 1).init(&device);
        let optim = SgdConfig::new().init::<TestBackend, AgeModel<TestBackend>>();
        let meta = SnapshotMeta {
            epoch:      1,
            best_error: 5.0,
        };
        manager.save_snapshot("best", &model, &optim, &meta).unwrap();

        for name in ["best.model.bin", "best.optim.bin", "best.meta.json"] {
            assert!(dir.path().join(name).is_file(), "missing '{name}'");
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let model: AgeModel<TestBackend> =
            AgeModelConfig::new(ModelKind::ResNet18, 1).init(&device);
        let optim = SgdConfig::new().init::<TestBackend, AgeModel<TestBackend>>();

        let meta = SnapshotMeta {
            epoch:      10,
            best_error: 4.25,
        };
        manager
            .save_snapshot("ckpt_epoch_10", &model, &optim, &meta)
            .unwrap();

        let meta_path = manager.meta_path("ckpt_epoch_10");
        let (model, _optim, restored) =
            resume_training::<TestBackend, _, _>(&meta_path, model, optim, &device).unwrap();

        assert_eq!(restored.epoch, 10);
        assert_eq!(restored.best_error, 4.25);
        // The restored model still has the expected output shape.
        let images = burn::tensor::Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        let (output, _) = model.forward(images);
        assert_eq!(output.dims(), [1, 1]);
    }

    #[test]
    fn test_missing_snapshot_is_fatal() {
        assert!(load_meta(Path::new("/nowhere/best.meta.json")).is_err());
    }
}

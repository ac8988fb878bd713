// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Resolve run folder + logging  (Layer 6 - infra)
//   Step 2: Persist the run config        (Layer 2)
//   Step 3: Build transform pipelines     (Layer 4 - data)
//   Step 4: Load the manifest             (Layer 4 - data)
//   Step 5: Partition splits + datasets   (Layer 4 - data)
//   Step 6: Run training loop             (Layer 5 - ml)
//
// The run folder is derived from the full hyperparameter set, so
// two runs with the same flags land in the same place and runs
// with different flags never collide. `--resume` overrides this
// and continues inside the original run folder.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::AgeDataset,
    manifest::{load_records, split_records},
    transforms::TransformPipeline,
};
use crate::domain::Split;
use crate::infra::{checkpoint::CheckpointManager, logging};
use crate::ml::{
    loss::LossKind,
    model::{DatasetKind, ModelKind},
    trainer::run_training,
};

// ─── Run Configuration ────────────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so every run folder carries a run_config.json
// recording exactly how its checkpoints were produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub print_freq:    usize,
    pub save_freq:     usize,
    pub batch_size:    usize,
    pub num_workers:   usize,
    pub epochs:        usize,
    pub learning_rate: f64,
    pub lr_decay_rate: f64,
    pub weight_decay:  f32,
    pub momentum:      f64,
    pub alpha:         f32,
    pub trial:         String,
    pub loss:          LossKind,
    pub data_folder:   String,
    pub dataset:       DatasetKind,
    pub model:         ModelKind,
    pub resume:        Option<PathBuf>,
    pub aug:           String,
}

impl RunConfig {
    /// Human-readable run identifier built from every hyperparameter
    /// that changes the outcome. A resumed run keeps the name of the
    /// folder its checkpoint lives in.
    pub fn run_name(&self) -> String {
        if let Some(name) = self.resumed_run_name() {
            return name;
        }
        format!(
            "{}_{}_{}_ep_{}_lr_{}_d_{}_wd_{}_alpha_{}_mmt_{}_bsz_{}_aug_{}_trial_{}",
            self.loss,
            self.dataset,
            self.model,
            self.epochs,
            self.learning_rate,
            self.lr_decay_rate,
            self.weight_decay,
            self.alpha,
            self.momentum,
            self.batch_size,
            self.aug,
            self.trial,
        )
    }

    /// Folder all artifacts of this run go to:
    /// save/<dataset>_models/<run_name>/
    pub fn save_folder(&self) -> PathBuf {
        if let Some(meta_path) = &self.resume {
            if let Some(parent) = meta_path.parent() {
                return parent.to_path_buf();
            }
        }
        PathBuf::from("save")
            .join(format!("{}_models", self.dataset))
            .join(self.run_name())
    }

    fn resumed_run_name(&self) -> Option<String> {
        self.resume
            .as_ref()?
            .parent()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config:     RunConfig,
    run_folder: PathBuf,
}

impl TrainUseCase {
    /// Resolve the run folder, create it and attach logging to it.
    pub fn new(config: RunConfig) -> Result<Self> {
        let run_folder = config.save_folder();
        let existed    = run_folder.exists();
        fs::create_dir_all(&run_folder)
            .with_context(|| format!("cannot create run folder '{}'", run_folder.display()))?;

        logging::init_run_logging(&run_folder)?;
        if existed && config.resume.is_none() {
            tracing::warn!(
                "Run folder '{}' already exists — checkpoints will be overwritten",
                run_folder.display(),
            );
        }

        Ok(Self { config, run_folder })
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        tracing::info!("Run: {}", cfg.run_name());
        tracing::info!(
            "Config: loss={} alpha={} lr={} decay={} wd={} momentum={} bsz={} epochs={} aug='{}'",
            cfg.loss, cfg.alpha, cfg.learning_rate, cfg.lr_decay_rate,
            cfg.weight_decay, cfg.momentum, cfg.batch_size, cfg.epochs, cfg.aug,
        );

        // ── Persist the config next to the checkpoints ────────────────────────
        let config_path = self.run_folder.join("run_config.json");
        fs::write(&config_path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("cannot write '{}'", config_path.display()))?;

        // ── Transform pipelines ───────────────────────────────────────────────
        // Train gets the augmentations the user asked for; val/test only
        // get the deterministic resize + normalize.
        let train_transform = TransformPipeline::for_train(&cfg.aug)?;
        let eval_transform  = TransformPipeline::for_eval();
        tracing::info!("Train augmentations: {} ops", train_transform.op_count());

        // ── Manifest → per-split datasets ─────────────────────────────────────
        let records = load_records(&cfg.data_folder, cfg.dataset)?;
        let train_records = split_records(&records, Split::Train);
        let val_records   = split_records(&records, Split::Val);
        let test_records  = split_records(&records, Split::Test);
        tracing::info!(
            "Manifest: {} train / {} val / {} test samples",
            train_records.len(),
            val_records.len(),
            test_records.len(),
        );

        let train_dataset =
            AgeDataset::new(cfg.data_folder.as_str(), train_records, train_transform);
        let val_dataset =
            AgeDataset::new(cfg.data_folder.as_str(), val_records, eval_transform.clone());
        let test_dataset =
            AgeDataset::new(cfg.data_folder.as_str(), test_records, eval_transform);

        // ── Run training loop (Layer 5) ───────────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&self.run_folder)?;
        run_training(cfg, train_dataset, val_dataset, test_dataset, ckpt_manager)?;

        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn config() -> RunConfig {
        RunConfig {
            print_freq:    10,
            save_freq:     100,
            batch_size:    256,
            num_workers:   1,
            epochs:        400,
            learning_rate: 0.2,
            lr_decay_rate: 0.1,
            weight_decay:  1e-4,
            momentum:      0.9,
            alpha:         1.0,
            trial:         "0".to_string(),
            loss:          LossKind::from_str("FAR").unwrap(),
            data_folder:   "data".to_string(),
            dataset:       DatasetKind::AgeDb,
            model:         ModelKind::ResNet18,
            resume:        None,
            aug:           "crop,flip,color,grayscale".to_string(),
        }
    }

    #[test]
    fn test_run_name_encodes_all_hyperparameters() {
        assert_eq!(
            config().run_name(),
            "FAR_AgeDB_resnet18_ep_400_lr_0.2_d_0.1_wd_0.0001_alpha_1_mmt_0.9_bsz_256_\
             aug_crop,flip,color,grayscale_trial_0"
        );
    }

    #[test]
    fn test_run_name_is_deterministic() {
        assert_eq!(config().run_name(), config().run_name());
    }

    #[test]
    fn test_different_trials_get_different_folders() {
        let mut other = config();
        other.trial = "1".to_string();
        assert_ne!(config().save_folder(), other.save_folder());
    }

    #[test]
    fn test_save_folder_layout() {
        let folder = config().save_folder();
        assert!(folder.starts_with("save/AgeDB_models"));
    }

    #[test]
    fn test_resume_reuses_the_original_run_folder() {
        let mut cfg = config();
        cfg.resume = Some(PathBuf::from(
            "save/AgeDB_models/some_old_run/ckpt_epoch_100.meta.json",
        ));
        assert_eq!(cfg.run_name(), "some_old_run");
        assert_eq!(
            cfg.save_folder(),
            PathBuf::from("save/AgeDB_models/some_old_run")
        );
    }

    #[test]
    fn test_run_config_json_round_trip() {
        let cfg = config();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_name(), cfg.run_name());
    }
}

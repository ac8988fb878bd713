// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, LossKind, ...)
//
// Closed choices (loss, model, dataset, split) parse through
// FromStr, so a typo like `--loss focal` is a hard CLI error
// instead of silently training with a default criterion.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::evaluate_use_case::EvalConfig;
use crate::application::train_use_case::RunConfig;
use crate::domain::Split;
use crate::ml::loss::LossKind;
use crate::ml::model::{DatasetKind, ModelKind};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the age regression model on a face dataset
    Train(TrainArgs),

    /// Score a saved checkpoint on a dataset split
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
/// Defaults follow the reference AgeDB recipe.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Print a progress line every N training batches
    #[arg(long, default_value_t = 10)]
    pub print_freq: usize,

    /// Save a periodic checkpoint every N epochs
    #[arg(long, default_value_t = 100)]
    pub save_freq: usize,

    /// Number of samples processed together in one forward pass
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Number of data loading workers
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 400)]
    pub epochs: usize,

    /// Initial learning rate for SGD
    #[arg(long, default_value_t = 0.2)]
    pub learning_rate: f64,

    /// Decay rate for the cosine learning rate floor (eta_min = lr * rate^3)
    #[arg(long, default_value_t = 0.1)]
    pub lr_decay_rate: f64,

    /// L2 weight decay penalty
    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f32,

    /// SGD momentum
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    /// Alpha parameter: regularizer weight for FAR/ConR/ranksim,
    /// beta for the focal losses
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f32,

    /// Id for recording multiple runs of the same configuration
    #[arg(long, default_value = "0")]
    pub trial: String,

    /// Loss to optimize: L1, FAR, FAR-EXP, ConR, ranksim, focal-l1, focal-mse
    #[arg(long, default_value = "FAR")]
    pub loss: LossKind,

    /// Path to the dataset root (must contain agedb.csv and the images)
    #[arg(long, default_value = "data")]
    pub data_folder: String,

    /// Dataset kind (determines the label dimensionality)
    #[arg(long, default_value = "AgeDB")]
    pub dataset: DatasetKind,

    /// Encoder architecture: resnet18 or resnet50
    #[arg(long, default_value = "resnet18")]
    pub model: ModelKind,

    /// Resume from a checkpoint meta file (e.g. save/.../ckpt_epoch_100.meta.json)
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Comma separated augmentation list applied to the train split
    #[arg(long, default_value = "crop,flip,color,grayscale")]
    pub aug: String,
}

/// Convert CLI TrainArgs into the application-layer RunConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        RunConfig {
            print_freq:    a.print_freq,
            save_freq:     a.save_freq,
            batch_size:    a.batch_size,
            num_workers:   a.num_workers,
            epochs:        a.epochs,
            learning_rate: a.learning_rate,
            lr_decay_rate: a.lr_decay_rate,
            weight_decay:  a.weight_decay,
            momentum:      a.momentum,
            alpha:         a.alpha,
            trial:         a.trial,
            loss:          a.loss,
            data_folder:   a.data_folder,
            dataset:       a.dataset,
            model:         a.model,
            resume:        a.resume,
            aug:           a.aug,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Checkpoint meta file saved during training
    /// (e.g. save/AgeDB_models/<run>/best.meta.json)
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Path to the dataset root (same layout as used during training)
    #[arg(long, default_value = "data")]
    pub data_folder: String,

    /// Dataset kind (must match the trained checkpoint)
    #[arg(long, default_value = "AgeDB")]
    pub dataset: DatasetKind,

    /// Encoder architecture the checkpoint was trained with
    #[arg(long, default_value = "resnet18")]
    pub model: ModelKind,

    /// Which split to score
    #[arg(long, default_value = "test")]
    pub split: Split,

    /// Batch size for the evaluation pass
    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    /// Number of data loading workers
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

/// Same boundary as for training: the application layer only
/// sees its own config type, never clap's.
impl From<EvaluateArgs> for EvalConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvalConfig {
            checkpoint:  a.checkpoint,
            data_folder: a.data_folder,
            dataset:     a.dataset,
            model:       a.model,
            split:       a.split,
            batch_size:  a.batch_size,
            num_workers: a.num_workers,
        }
    }
}

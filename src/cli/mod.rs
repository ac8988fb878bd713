// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — trains the age regressor on a face dataset
//   2. `evaluate` — loads a checkpoint and scores it on a split

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "age-regression",
    version = "0.1.0",
    about = "Train a ResNet age regressor on face images, then evaluate checkpoints."
)]
pub struct Cli {
    /// The subcommand to run (train or evaluate)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    /// The handlers are associated functions: matching moves the args
    /// out of `self.command`, so no `&self` may survive the match.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => Self::run_train(args),
            Commands::Evaluate(args) => Self::run_evaluate(args),
        }
    }

    /// Handles the `train` subcommand.
    /// Converts CLI args into a RunConfig and hands off to Layer 2.
    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        // Convert CLI args → application config (separates presentation from domain)
        let use_case = TrainUseCase::new(args.into())?;
        use_case.execute()?;

        println!("Training complete.");
        Ok(())
    }

    /// Handles the `evaluate` subcommand.
    /// Loads the model from a checkpoint and prints split metrics.
    fn run_evaluate(args: EvaluateArgs) -> Result<()> {
        use crate::application::evaluate_use_case::EvaluateUseCase;

        let use_case = EvaluateUseCase::new(args.into())?;
        let result   = use_case.execute()?;
        println!("{result}");
        Ok(())
    }
}

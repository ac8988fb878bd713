#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;

fn main() -> Result<()> {
    // Logging is initialized per run once the save folder is resolved
    // (see infra::logging), so the log file lands next to the checkpoints.
    let cli = Cli::parse();
    cli.run()
}

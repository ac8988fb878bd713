// ============================================================
// Layer 6 — Logging Setup
// ============================================================
// Every training run gets a `training.log` inside its own run
// folder, mirroring everything that goes to stdout (minus the
// ANSI colour codes). Evaluate runs only log to stdout.
//
// Initialisation is deferred until the run folder exists, so
// the subscriber can attach the file writer up front. RUST_LOG
// overrides the default "info" filter as usual.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Open the run log in append mode: a resumed run reuses its
/// original folder and must not wipe the log it is continuing.
fn open_log_file(log_path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("cannot open log file '{}'", log_path.display()))
}

/// Log to stdout AND to `<run_folder>/training.log`.
pub fn init_run_logging(run_folder: &Path) -> Result<()> {
    let log_path = run_folder.join("training.log");
    let log_file = open_log_file(&log_path)?;

    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    tracing::info!("logging to '{}'", log_path.display());
    Ok(())
}

/// Stdout-only logging, for commands without a run folder.
pub fn init_process_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer())
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_is_opened_in_append_mode() {
        // Opening twice (as a resumed run does) must keep earlier content.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.log");

        writeln!(open_log_file(&path).unwrap(), "first run").unwrap();
        writeln!(open_log_file(&path).unwrap(), "resumed run").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("first run"));
        assert!(content.contains("resumed run"));
    }
}

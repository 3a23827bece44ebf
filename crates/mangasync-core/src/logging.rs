//! Logging init: append to a file under the XDG state dir, or fall back to stderr.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,mangasync=debug,mangasync_core=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// `~/.local/state/mangasync/mangasync.log`.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mangasync")?;
    Ok(xdg_dirs.get_state_home().join("mangasync.log"))
}

/// Initialize structured logging to the state-dir log file.
/// Returns Err if the file cannot be opened so the caller can use `init_logging_stderr`.
pub fn init_logging() -> Result<()> {
    let path = log_file_path()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create log dir: {}", dir.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))?;

    tracing::info!("mangasync logging initialized at {}", path.display());
    Ok(())
}

/// Initialize logging to stderr only. Safe to call when a subscriber is already set.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

//! Shared logging utilities for scoutwatch.
//!
//! Two sinks: `tracing` output (rolling file + stderr) for diagnostics, and
//! the bounded [`OperatorLog`] for the operator console.

mod operator;
mod rolling;

pub use operator::{OperatorLog, Severity, DEFAULT_OPERATOR_LINES};

use anyhow::{Context, Result};
use rolling::{RollingFile, SharedRollingFile};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "scoutwatch=info,scoutwatch_db=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for the scoutwatch binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the full filter to stderr instead of warnings only.
    pub verbose: bool,
    /// Start a new log generation instead of appending to the last run's.
    pub fresh_file: bool,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file = RollingFile::open(
        &log_dir,
        config.app_name,
        MAX_LOG_FILES,
        MAX_LOG_FILE_SIZE,
        config.fresh_file,
    )
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let file_filter = default_filter();
    let console_filter = if config.verbose {
        default_filter()
    } else {
        EnvFilter::new("warn,scoutwatch::operator=info")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(SharedRollingFile::new(file))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Global tracing subscriber already set")?;

    Ok(())
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Get the scoutwatch home directory: ~/.scoutwatch
///
/// `SCOUTWATCH_HOME` overrides it; without a home directory the current
/// directory is used.
pub fn scoutwatch_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("SCOUTWATCH_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|home| home.join(".scoutwatch"))
        .unwrap_or_else(|| PathBuf::from(".scoutwatch"))
}

/// Get the logs directory: ~/.scoutwatch/logs
pub fn logs_dir() -> PathBuf {
    scoutwatch_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

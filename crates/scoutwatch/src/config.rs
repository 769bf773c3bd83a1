//! Configuration for scoutwatch.
//!
//! Reads settings from `~/.scoutwatch/config.toml`. Every key is optional;
//! a missing file yields the defaults.

use crate::error::{IngestError, Result};
use crate::retry::RetryPolicy;
use scoutwatch_logging::{scoutwatch_home, DEFAULT_OPERATOR_LINES};
use scoutwatch_protocol::HeaderLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config location: ~/.scoutwatch/config.toml
pub fn default_config_path() -> PathBuf {
    scoutwatch_home().join("config.toml")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutwatchConfig {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub volume: VolumeConfig,

    #[serde(default)]
    pub operator_log: OperatorLogConfig,
}

impl ScoutwatchConfig {
    /// Load from an explicit path. The file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        toml::from_str(&content)
            .map_err(|e| IngestError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `path` if given, else the default location if it exists, else
    /// the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| IngestError::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| IngestError::io(path, e))
    }
}

/// Directory watching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory the tablets' files are dropped into
    #[serde(default = "default_watch_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Also ingest files that change after they were first seen
    #[serde(default)]
    pub include_modified: bool,

    /// How often a watcher paused by a store outage tries the store again;
    /// 0 waits for the operator
    #[serde(default = "default_resume_interval_ms")]
    pub resume_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: default_watch_directory(),
            poll_interval_ms: default_poll_interval_ms(),
            include_modified: false,
            resume_interval_ms: default_resume_interval_ms(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn resume_interval(&self) -> Option<Duration> {
        (self.resume_interval_ms > 0).then(|| Duration::from_millis(self.resume_interval_ms))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Header layout of the deployed tablet software: "a" or "b"
    #[serde(default)]
    pub layout: HeaderLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Extra attempts for a failed record insert before the form is
    /// reported as partially persisted
    #[serde(default = "default_record_retries")]
    pub record_retries: u32,

    #[serde(default = "default_connect_retry")]
    pub connect_retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            record_retries: default_record_retries(),
            connect_retry: default_connect_retry(),
        }
    }
}

/// Verbatim copies of every ingested file onto a removable volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_enabled")]
    pub enabled: bool,

    /// First `scoutingfile<N>` index used by a session
    #[serde(default)]
    pub start_index: u64,

    /// Volume lookup for a single backup; kept short so the watch loop
    /// is not held up when no drive is plugged in
    #[serde(default = "default_backup_retry")]
    pub locate_retry: RetryPolicy,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: default_backup_enabled(),
            start_index: 0,
            locate_retry: default_backup_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Directories whose children are candidate removable volumes
    #[serde(default = "default_mount_roots")]
    pub mount_roots: Vec<PathBuf>,

    /// Volume lookup for USB import
    #[serde(default = "default_volume_retry")]
    pub retry: RetryPolicy,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            mount_roots: default_mount_roots(),
            retry: default_volume_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorLogConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

impl Default for OperatorLogConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
        }
    }
}

fn default_watch_directory() -> PathBuf {
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
        .unwrap_or_else(|| PathBuf::from("."))
}
fn default_poll_interval_ms() -> u64 { 500 }
fn default_resume_interval_ms() -> u64 { 30_000 }
fn default_database_path() -> PathBuf { scoutwatch_home().join("scouting.sqlite3") }
fn default_record_retries() -> u32 { 2 }
fn default_backup_enabled() -> bool { true }
fn default_max_lines() -> usize { DEFAULT_OPERATOR_LINES }

fn default_connect_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 200,
        max_backoff_ms: 1_000,
        multiplier: 2,
        timeout_ms: 5_000,
    }
}

fn default_backup_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff_ms: 250,
        max_backoff_ms: 250,
        multiplier: 1,
        timeout_ms: 1_000,
    }
}

fn default_volume_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 10,
        initial_backoff_ms: 250,
        max_backoff_ms: 2_000,
        multiplier: 2,
        timeout_ms: 15_000,
    }
}

/// Per-user removable media mount points on Linux and macOS.
fn default_mount_roots() -> Vec<PathBuf> {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok();
    let mut roots = Vec::new();
    match user {
        Some(user) => {
            roots.push(PathBuf::from("/media").join(&user));
            roots.push(PathBuf::from("/run/media").join(&user));
        }
        None => {
            roots.push(PathBuf::from("/media"));
            roots.push(PathBuf::from("/run/media"));
        }
    }
    roots.push(PathBuf::from("/Volumes"));
    roots
}

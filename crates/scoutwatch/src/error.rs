//! Error taxonomy for the ingestion pipeline.

use scoutwatch_db::StoreError;
use scoutwatch_protocol::DecodeError;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] DecodeError),

    #[error("No removable volume found after {attempts} attempts ({elapsed_ms} ms)")]
    VolumeNotFound { attempts: u32, elapsed_ms: u64 },

    /// No connection could be opened; ingestion halts until an operator acts.
    #[error("Store unavailable after {attempts} attempts: {message}")]
    StoreUnavailable { attempts: u32, message: String },

    #[error("Store operation failed: {0}")]
    StoreOperationFailed(#[source] StoreError),

    #[error(
        "Form {form_id} partially persisted: {stored} of {total} records stored, item {item_id} failed"
    )]
    PartiallyPersisted {
        form_id: i64,
        stored: usize,
        total: usize,
        item_id: i32,
        #[source]
        source: StoreError,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl IngestError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Errors that stop the watch loop instead of skipping one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::StoreUnavailable { .. })
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => IngestError::StoreUnavailable {
                attempts: 1,
                message,
            },
            other => IngestError::StoreOperationFailed(other),
        }
    }
}

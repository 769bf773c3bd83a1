//! Error types for the store layer.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store errors.
///
/// `Unavailable` means no connection could be opened at all; `Operation`
/// means a single call on an open connection failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation '{operation}' failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn operation(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Operation {
            operation,
            message: err.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

//! Protocol error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decode failures. `form` is the zero-based index of the non-empty form
/// segment within the payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("form {form}: missing header field '{field}'")]
    MissingHeaderField { form: usize, field: &'static str },

    #[error("form {form}: header field '{field}' is not a number: {value:?}")]
    InvalidNumber {
        form: usize,
        field: &'static str,
        value: String,
    },

    #[error("form {form}: unknown form type ordinal {ordinal}")]
    UnknownFormType { form: usize, ordinal: u32 },

    #[error("form {form}, field {field}: record {raw:?} has no ',' separator")]
    MissingRecordSeparator {
        form: usize,
        field: usize,
        raw: String,
    },

    #[error("form {form}, field {field}: record item id is not a number: {raw:?}")]
    InvalidItemId {
        form: usize,
        field: usize,
        raw: String,
    },
}

impl DecodeError {
    /// True when the error discarded the whole form rather than one record.
    pub fn is_header_error(&self) -> bool {
        matches!(
            self,
            DecodeError::MissingHeaderField { .. }
                | DecodeError::InvalidNumber { .. }
                | DecodeError::UnknownFormType { .. }
        )
    }

    /// Index of the form segment the error belongs to.
    pub fn form_index(&self) -> usize {
        match self {
            DecodeError::MissingHeaderField { form, .. }
            | DecodeError::InvalidNumber { form, .. }
            | DecodeError::UnknownFormType { form, .. }
            | DecodeError::MissingRecordSeparator { form, .. }
            | DecodeError::InvalidItemId { form, .. } => *form,
        }
    }
}

//! Error types for update entry decoding.

use thiserror::Error;

/// Reasons an update entry cannot be interpreted.
///
/// All of these are soft failures for the consumer: the entry is logged and
/// skipped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Update payload is not a JSON object")]
    NotAnObject,

    #[error("Update is missing orderHash")]
    MissingOrderHash,

    #[error("Field '{field}' has unexpected type, expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

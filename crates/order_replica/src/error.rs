//! Error types for the order replica.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("External service error: {0}")]
    External(#[from] external_services::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed update: {0}")]
    Decode(#[from] normalizer::DecodeError),

    #[error("Order book not implemented: '{0}'")]
    UnknownOrderBook(String),

    #[error("Order {0} has no offChainData")]
    MissingOffChainData(String),

    #[error("Order conversion failed: {0}")]
    Conversion(String),

    #[error("Snapshot entry {0} has no payload")]
    EmptySnapshot(String),

    #[error("Update stream read failed after {attempts} attempt(s): {source}")]
    ReadFailed {
        attempts: u32,
        #[source]
        source: external_services::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

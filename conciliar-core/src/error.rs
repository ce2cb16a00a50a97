//! Error taxonomy shared by every conciliar crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Statement text had no recognizable structure for the requested step.
    #[error("parse error: {0}")]
    Parse(String),

    /// Storage backend failure (network, disk, remote API).
    #[error("store error: {0}")]
    Store(String),

    /// Expected-missing resource, e.g. the metadata document on first run.
    #[error("not found: {0}")]
    NotFound(String),

    /// Input rejected before any store call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid amount '{0}'")]
    Amount(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn store(msg: impl std::fmt::Display) -> Self {
        Error::Store(msg.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

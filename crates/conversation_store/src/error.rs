//! Store error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conversation not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write not acknowledged: {0}")]
    WriteNotAcknowledged(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

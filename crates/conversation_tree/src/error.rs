use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while manipulating a conversation tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The referenced message id is not part of the tree.
    #[error("message {0} not found")]
    NotFound(Uuid),

    /// The requested mutation would break the tree shape.
    #[error("invalid tree operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use conversation_store::StoreError;
use conversation_tree::TreeError;
use serde::Serialize;
use thiserror::Error;

use crate::generation::GenerationError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// An illegal tree mutation, e.g. continuing a non-leaf message.
    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Model not available anymore")]
    ModelNotAvailable,

    /// A checkpoint write was not acknowledged.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Backend failure before any stream was started. Mid-stream failures
    /// are reported in-band instead.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("Conversation not found".to_string()),
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<TreeError> for AppError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound(id) => AppError::NotFound(format!("Message {id} not found")),
            TreeError::InvalidOperation(message) => AppError::InvalidOperation(message),
        }
    }
}

#[derive(Serialize)]
struct JsonError {
    message: String,
    r#type: String,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ModelNotAvailable => StatusCode::GONE,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Generation(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_response = JsonErrorWrapper {
            error: JsonError {
                message: self.to_string(),
                r#type: "api_error".to_string(),
            },
        };
        HttpResponse::build(status_code).json(error_response)
    }
}

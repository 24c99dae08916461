use serde_json::{json, Value};
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::llm_client::LlmError;
use crate::reconstruct::ReconstructionError;
use crate::storage::StorageError;

/// Application-level error type.
/// Every variant maps to a stable machine code and a structured failure body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(id) => AppError::NotFound(format!("template '{id}'")),
            StorageError::InvalidId(_) => AppError::Validation(e.to_string()),
            StorageError::VersionExists { .. } => AppError::Conflict(e.to_string()),
            StorageError::S3(msg) => AppError::S3(msg),
            StorageError::Io(_) | StorageError::Serde(_) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        AppError::UnprocessableEntity(e.to_string())
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        AppError::Llm(e.to_string())
    }
}

impl From<ReconstructionError> for AppError {
    fn from(e: ReconstructionError) -> Self {
        match e {
            ReconstructionError::Unreadable(_) => AppError::UnprocessableEntity(e.to_string()),
            other => AppError::Internal(other.into()),
        }
    }
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::S3(_) => "S3_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand back to a caller. Backend failures are logged
    /// in full and summarised.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::UnprocessableEntity(msg) => msg.clone(),
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                "A storage error occurred".to_string()
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                "An AI processing error occurred".to_string()
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                "A storage error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal error occurred".to_string()
            }
        }
    }

    pub fn to_failure_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.public_message()
            }
        })
    }
}

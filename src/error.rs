//! Error types for the CMS Sync server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::compare::Side;
use crate::platform::PlatformError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Comparison and sync errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A natural key appears more than once within one side
    #[error("Duplicate {field} '{key}' in {side} content")]
    DuplicateKey {
        side: Side,
        field: &'static str,
        key: String,
    },

    /// A record has no usable natural key
    #[error("Record #{index} in {side} content has no {field}")]
    MissingNaturalKey {
        side: Side,
        field: &'static str,
        index: usize,
    },

    /// The requested sync plan is invalid
    #[error("Invalid sync plan: {0}")]
    Validation(String),

    /// A create was planned for a key whose source record is absent
    #[error("Source record missing for '{0}'")]
    MissingSourceData(String),

    /// The destination rejected one write
    #[error("Platform rejected write: {0}")]
    PlatformWrite(String),

    /// The destination cannot be used at all
    #[error("Platform unreachable: {0}")]
    PlatformUnreachable(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Sync(e) => match e {
                SyncError::DuplicateKey { .. } => {
                    (StatusCode::BAD_REQUEST, "duplicate_key", e.to_string())
                }
                SyncError::MissingNaturalKey { .. } => {
                    (StatusCode::BAD_REQUEST, "missing_key", e.to_string())
                }
                SyncError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "validation_error", e.to_string())
                }
                SyncError::MissingSourceData(_) => {
                    tracing::error!("Sync invariant violated: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "missing_source_data",
                        e.to_string(),
                    )
                }
                SyncError::PlatformWrite(_) | SyncError::PlatformUnreachable(_) => {
                    (StatusCode::BAD_GATEWAY, "platform_error", e.to_string())
                }
            },
            AppError::Platform(e) => {
                tracing::warn!("Platform error: {}", e);
                (e.status_code(), "platform_error", e.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "serialization_error",
                    "Failed to process JSON".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "io_error",
                    "IO error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Convenience type alias for Results with [`CoreError`]
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the task dispatch and execution core.
///
/// Each variant maps to a declared HTTP shape at the API boundary (see
/// `api::error::into_response`). Store and outbound-service failures carry
/// `#[from]` so `?` composes through the store and executor-client layers;
/// the outermost handler decides how much of the underlying error to expose.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rejected input: missing field, too-short notes, malformed payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown task, queue entry, idea task, or tenant-scoped entity.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad bearer token or bad passphrase.
    #[error("unauthorized")]
    Unauthorized,

    /// Duplicate passphrase registration, double-dispatch attempt.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Relational store failure. Retried at the caller in the executor path;
    /// surfaced as a redacted 500 at the API boundary.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Outbound call to the executor service failed (timeout, connection
    /// refused, non-2xx response already turned into this by the client).
    #[error("executor service error: {0}")]
    ExecutorService(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Programming bugs and anything that doesn't fit the taxonomy above.
    /// Full message only in development; production responses use a
    /// constant body (see `api::error`).
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }
}

/// HTTP shape for each variant (§7). Store/executor-service/internal
/// failures are logged with full detail and redacted in the response body.
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        match self {
            CoreError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "code": "VALIDATION_ERROR", "message": message })))
                    .into_response()
            }
            CoreError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "code": "NOT_FOUND", "message": message }))).into_response()
            }
            CoreError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "code": "UNAUTHORIZED", "message": "unauthorized" })))
                    .into_response()
            }
            CoreError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "code": "CONFLICT", "message": message }))).into_response()
            }
            CoreError::Store(err) => {
                tracing::error!(error = %err, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "INTERNAL_ERROR", "message": "a storage error occurred" })),
                )
                    .into_response()
            }
            CoreError::ExecutorService(err) => {
                tracing::error!(error = %err, "executor service error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "EXECUTOR_SERVICE_ERROR", "message": "the executor service is unavailable" })),
                )
                    .into_response()
            }
            CoreError::Configuration(message) => {
                tracing::error!(error = %message, "configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "INTERNAL_ERROR", "message": "internal configuration error" })),
                )
                    .into_response()
            }
            CoreError::Serialization(err) => {
                tracing::error!(error = %err, "serialization error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "INTERNAL_ERROR", "message": "internal error" })),
                )
                    .into_response()
            }
            CoreError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": "INTERNAL_ERROR", "message": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}

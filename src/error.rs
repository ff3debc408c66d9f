use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad input shape or range. Retrying without changing the input is pointless.
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient persistence failure; callers may retry with backoff.
    #[error("storage error: {0}")]
    Storage(String),

    /// The device position source is gone (permission denied, hardware off).
    #[error("position source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::SourceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => tonic::Status::invalid_argument(msg),
            AppError::NotFound(msg) => tonic::Status::not_found(msg),
            AppError::Conflict(msg) => tonic::Status::failed_precondition(msg),
            AppError::Storage(msg) => tonic::Status::unavailable(msg),
            AppError::SourceUnavailable(msg) => tonic::Status::unavailable(msg),
            AppError::Internal(msg) => tonic::Status::internal(msg),
        }
    }
}

//! Application error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::cache::CacheError;

/// Application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("cache invalidation failed")]
    Cache(#[from] CacheError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Invalid signature" })),
            )
                .into_response(),
            AppError::MalformedPayload(e) => {
                tracing::error!(error = %e, "malformed request payload");
                internal_error(e.to_string())
            }
            AppError::Cache(e) => {
                tracing::error!(error = %e, "cache invalidation failed");
                internal_error(e.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                internal_error(e.to_string())
            }
        }
    }
}

fn internal_error(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": "Internal server error",
            "message": message,
        })),
    )
        .into_response()
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

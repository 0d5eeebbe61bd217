//! Error types and Axum response conversions.
//!
//! Guard rejections map to the bare responses clients of the gate expect:
//! a 302 to a login page, an empty 403, or an empty 200 acknowledgment.

use crate::storage::CacheError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Redirect to {0}")]
    Redirect(String),

    #[error("Request already consumed")]
    AlreadyConsumed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
            AppError::Forbidden => StatusCode::FORBIDDEN.into_response(),
            AppError::Redirect(location) => {
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
            AppError::AlreadyConsumed => StatusCode::OK.into_response(),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Internal(format!("Cache error: {}", err))
    }
}

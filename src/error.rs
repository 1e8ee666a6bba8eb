// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API errors that can occur during request processing
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (provider error descriptor, message verbatim)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Error from the backend provider (PostgREST / GoTrue)
    #[error("Provider error: {status} - {message}")]
    Provider { status: u16, message: String },

    /// Request validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Idea generation failed (missing credential, non-JSON or malformed response)
    #[error("Idea generation failed: {0}")]
    Ai(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[allow(dead_code)]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Auth(msg) => (StatusCode::UNAUTHORIZED, "auth_error", msg),
            ApiError::Provider { status, message } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status_code, "provider_error", message)
            }
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Ai(msg) => (StatusCode::BAD_GATEWAY, "ai_error", msg),
            ApiError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg),
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, ApiError>;

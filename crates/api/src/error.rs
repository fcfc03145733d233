use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use photerra_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `photerra_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Cancelled => (
                    StatusCode::CONFLICT,
                    "CANCELLED",
                    CoreError::Cancelled.to_string(),
                ),
                CoreError::Processing { step, message } => {
                    tracing::error!(step = %step, error = %message, "Processing error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PROCESSING_ERROR",
                        format!("Processing failed during {step}: {message}"),
                    )
                }
                CoreError::ResourceExhausted {
                    message,
                    remediation,
                } => (
                    StatusCode::INSUFFICIENT_STORAGE,
                    "RESOURCE_EXHAUSTED",
                    format!("{message}. {remediation}"),
                ),
                CoreError::Io(err) => {
                    tracing::error!(error = %err, "I/O error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "IO_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

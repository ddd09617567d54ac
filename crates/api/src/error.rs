use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use slicer_core::error::CoreError;
use slicer_db::StoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Workers read responses with plain shell tools, so every body is short
/// plain text and the only statuses are 200 and 400.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `slicer_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// Body returned for any failure whose details belong in the server log only.
const SANITIZED: &str = "Internal error, see server log";

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::Database(sqlx::Error::RowNotFound),
            StoreError::Transient(e) | StoreError::Fatal(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Core(core) => match core {
                // Soft refusal: the worker prints it and stops.
                CoreError::Unauthorized(msg) => (StatusCode::OK, format!("echo {msg}, go away.")),
                CoreError::Forbidden(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                CoreError::UnknownName { entity, name } => {
                    (StatusCode::BAD_REQUEST, format!("Unknown {entity} '{name}'"))
                }
                CoreError::NotFound { entity, id } => {
                    tracing::error!(entity, id, "Referenced row vanished");
                    (StatusCode::BAD_REQUEST, SANITIZED.to_string())
                }
                CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                CoreError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (StatusCode::BAD_REQUEST, SANITIZED.to_string())
                }
            },

            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (StatusCode::BAD_REQUEST, SANITIZED.to_string())
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),

            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::BAD_REQUEST, SANITIZED.to_string())
            }
        };

        (status, format!("{message}\n")).into_response()
    }
}

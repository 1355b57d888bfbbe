//! Error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] docwatch_core::Error),

    /// Transport setup error.
    #[error("transport error: {0}")]
    Transport(#[from] docwatch_transport::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A watcher stopped with an error.
    #[error("watcher for {collection} failed: {source}")]
    Watcher {
        collection: String,
        #[source]
        source: docwatch_core::Error,
    },

    /// A watcher task panicked or was aborted.
    #[error("watcher task did not complete: {0}")]
    WatcherTask(String),
}

/// HTTP API error type.
#[derive(Debug)]
pub enum AppError {
    /// Internal server error.
    Internal(String),
    /// Bad request.
    BadRequest(String),
    /// Not found.
    NotFound(String),
    /// Conflict with the stored state.
    Conflict(String),
}

/// Error response body.
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error flag.
    pub error: bool,
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
        };

        let body = ErrorResponse {
            error: true,
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<docwatch_core::Error> for AppError {
    fn from(err: docwatch_core::Error) -> Self {
        use docwatch_core::Error as CoreError;

        match err {
            CoreError::DocumentNotFound(_) => AppError::NotFound(err.to_string()),
            CoreError::DocumentExists(_) => AppError::Conflict(err.to_string()),
            CoreError::InvalidDocument(_) => AppError::BadRequest(err.to_string()),
            _ => {
                tracing::error!(error = %err, "request failed");
                AppError::Internal(err.to_string())
            }
        }
    }
}

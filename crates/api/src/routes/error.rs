//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use syncbridge_domain::SyncBridgeError;
use thiserror::Error;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Back-pressure or a dependency that may recover
    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl From<SyncBridgeError> for ApiError {
    fn from(err: SyncBridgeError) -> Self {
        match err {
            SyncBridgeError::NotFound(m) => Self::NotFound(m),
            SyncBridgeError::Conflict(m) => Self::Conflict(m),
            SyncBridgeError::Transient(m) => Self::Unavailable(m),
            SyncBridgeError::Permanent(m) | SyncBridgeError::Config(m) => Self::BadRequest(m),
            SyncBridgeError::Internal(m) => Self::Internal(m),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }

        let body = ErrorResponse { error: error_code.to_string(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use reqwest::StatusCode;
use syncbridge_domain::SyncBridgeError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub SyncBridgeError);

impl From<InfraError> for SyncBridgeError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<SyncBridgeError> for InfraError {
    fn from(value: SyncBridgeError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoSyncBridgeError {
    fn into_syncbridge(self) -> SyncBridgeError;
}

/* -------------------------------------------------------------------------- */
/* HTTP status → SyncBridgeError */
/* -------------------------------------------------------------------------- */

/// Classify a non-success HTTP status.
///
/// 404 is not-found, 409 is a conflict, 408/429/5xx are transient and every
/// other 4xx is permanent.
pub fn classify_status(status: StatusCode, context: &str) -> SyncBridgeError {
    let code = status.as_u16();
    let message = format!(
        "{context}: HTTP {code} {}",
        status.canonical_reason().unwrap_or("unknown status")
    );

    match code {
        404 => SyncBridgeError::NotFound(message),
        409 => SyncBridgeError::Conflict(message),
        408 | 429 => SyncBridgeError::Transient(message),
        500..=599 => SyncBridgeError::Transient(message),
        400..=499 => SyncBridgeError::Permanent(message),
        _ => SyncBridgeError::Permanent(message),
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → SyncBridgeError */
/* -------------------------------------------------------------------------- */

impl IntoSyncBridgeError for HttpError {
    fn into_syncbridge(self) -> SyncBridgeError {
        if self.is_timeout() {
            return SyncBridgeError::Transient("HTTP request timed out".into());
        }

        if self.is_connect() {
            return SyncBridgeError::Transient("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return classify_status(status, "request failed");
        }

        if self.is_decode() {
            return SyncBridgeError::Permanent(format!("unexpected response body: {self}"));
        }

        if self.is_builder() {
            return SyncBridgeError::Internal(format!("invalid HTTP request: {self}"));
        }

        SyncBridgeError::Transient(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_syncbridge())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Entity or mapping absent (usually benign, treated as a skip)
    NotFound,
    /// Duplicate mapping (benign, logged distinctly, never retried)
    Conflict,
    /// Network failures and 5xx responses (retried with backoff)
    Transient,
    /// Validation failures and other 4xx responses (needs manual repair)
    Permanent,
    /// Invalid local configuration
    Config,
    /// Unexpected internal failure
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NotFound => "not-found",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Main error type for SyncBridge
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SyncBridgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncBridgeError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Transient(_) => ErrorCategory::Transient,
            Self::Permanent(_) => ErrorCategory::Permanent,
            Self::Config(_) => ErrorCategory::Config,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(message)
            | Self::Conflict(message)
            | Self::Transient(message)
            | Self::Permanent(message)
            | Self::Config(message)
            | Self::Internal(message) => message,
        }
    }
}

/// Result type alias for SyncBridge operations
pub type Result<T> = std::result::Result<T, SyncBridgeError>;

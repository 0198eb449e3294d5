//! Lifecycle errors shared by background workers

use std::time::Duration;

use syncbridge_domain::SyncBridgeError;
use thiserror::Error;

use super::InfraError;

/// Errors raised while starting or stopping a background worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker already running")]
    AlreadyRunning,

    #[error("Worker not running")]
    NotRunning,

    #[error("Worker task did not finish within {duration:?}")]
    JoinTimeout { duration: Duration },

    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

impl From<WorkerError> for InfraError {
    fn from(err: WorkerError) -> Self {
        InfraError(SyncBridgeError::Internal(err.to_string()))
    }
}

impl From<WorkerError> for SyncBridgeError {
    fn from(err: WorkerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for worker lifecycle operations
pub type WorkerResult<T> = Result<T, WorkerError>;

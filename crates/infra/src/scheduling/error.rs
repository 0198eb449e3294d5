//! Scheduler error types

use std::time::Duration;

use syncbridge_domain::SyncBridgeError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    #[error("Failed to create scheduler: {0}")]
    CreationFailed(String),

    #[error("Failed to start scheduler: {0}")]
    StartFailed(String),

    #[error("Failed to stop scheduler: {0}")]
    StopFailed(String),

    /// Cron expression rejected or job not accepted by the scheduler
    #[error("Failed to register job: {0}")]
    JobRegistrationFailed(String),

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let domain_err = match err {
            SchedulerError::JobRegistrationFailed(_) => SyncBridgeError::Config(err.to_string()),
            _ => SyncBridgeError::Internal(err.to_string()),
        };
        InfraError(domain_err)
    }
}

impl From<SchedulerError> for SyncBridgeError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_cron_maps_to_config_error() {
        let err: SyncBridgeError =
            SchedulerError::JobRegistrationFailed("invalid cron".into()).into();
        assert!(matches!(err, SyncBridgeError::Config(_)));
    }

    #[test]
    fn lifecycle_errors_map_to_internal() {
        let err: SyncBridgeError = SchedulerError::NotRunning.into();
        assert!(matches!(err, SyncBridgeError::Internal(_)));
    }
}

//! Cron scheduling of reconciliation runs
//!
//! The scheduler follows the runtime rules used across this crate:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on all async operations

pub mod error;
pub mod reconciliation_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use reconciliation_scheduler::{
    ReconciliationJob, ReconciliationScheduler, ReconciliationSchedulerConfig,
};

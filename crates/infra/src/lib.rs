//! # SyncBridge Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - HTTP clients for the source API, the target system and the mapping
//!   service
//! - The configuration-driven entity mapper
//! - The in-process mapping retry queue, its worker and the dead-letter store
//! - Partitioned notification dispatch
//! - Cron scheduling of reconciliation runs
//! - Configuration loading and the log-backed telemetry sink
//!
//! ## Architecture
//! - Implements traits defined in `syncbridge-core`
//! - Depends on `syncbridge-domain` and `syncbridge-core`
//! - Contains all "impure" code (network I/O, timers, environment)

pub mod clients;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod mapping;
pub mod queue;
pub mod scheduling;
pub mod telemetry;

// Re-export commonly used items
pub use clients::{MappingServiceClient, SourceApiClient, TargetApiClient};
pub use dispatch::{ChangeHandler, NotificationDispatcher};
pub use errors::{InfraError, WorkerError};
pub use http::{HttpClient, HttpClientBuilder};
pub use mapping::ConfiguredEntityMapper;
pub use queue::{
    InMemoryDeadLetterStore, InMemoryRetryQueue, MappingRetryWorker, MappingRetryWorkerConfig,
    RetryReceiver,
};
pub use scheduling::{ReconciliationScheduler, ReconciliationSchedulerConfig};
pub use telemetry::TracingTelemetry;

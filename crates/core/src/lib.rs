//! # SyncBridge Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the mapping service, both systems of
//!   record, the retry queue, dead letters and telemetry
//! - The synchronization orchestrator and mapping retry processor
//! - The reconciliation engine and mismatch classifier
//!
//! ## Architecture Principles
//! - Only depends on `syncbridge-common` and `syncbridge-domain`
//! - No HTTP or platform code
//! - All external dependencies via traits

pub mod reconciliation;
pub mod sync;

// Infrastructure ports
pub mod telemetry_ports;

// Re-export specific items to avoid ambiguity
pub use reconciliation::{
    MismatchClassifier, Normalizer, ReconciliationDependencies, ReconciliationEngine,
    ReconciliationSettings,
};
pub use sync::ports::{
    DeadLetterStore, EntityMapper, MappingRetryQueue, MappingStore, SourceSystemClient,
    TargetSystemClient,
};
pub use sync::{
    MappingRetryProcessor, RetryDisposition, RetryableCaller, SyncDependencies, SyncOrchestrator,
};
pub use telemetry_ports::{TelemetryEvent, TelemetrySink};

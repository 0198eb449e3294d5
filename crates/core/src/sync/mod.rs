//! Entity synchronization: orchestrator, call boundary and mapping retries

pub mod caller;
pub mod orchestrator;
pub mod ports;
pub mod retry_processor;

pub use caller::{RetryableCaller, TransientOnly};
pub use orchestrator::{SyncDependencies, SyncOrchestrator};
pub use retry_processor::{MappingRetryProcessor, RetryDisposition};

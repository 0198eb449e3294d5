//! Mapping retry transport, consumer and dead-letter store

mod dead_letters;
mod retry_queue;
mod worker;

pub use dead_letters::InMemoryDeadLetterStore;
pub use retry_queue::{InMemoryRetryQueue, RetryReceiver};
pub use worker::{MappingRetryWorker, MappingRetryWorkerConfig};

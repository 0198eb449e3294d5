//! Infrastructure error conversions

mod conversions;
mod worker;

pub use conversions::{classify_status, InfraError};
pub use worker::{WorkerError, WorkerResult};

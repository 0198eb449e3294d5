//! Resilience patterns for fault tolerance
//!
//! A generic retry executor: bounded attempts, exponential or fixed backoff,
//! optional jitter and a per-error [`RetryPolicy`]. Domain crates supply the
//! policy that knows which of their errors are transient.

pub mod retry;

pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryPolicy, RetryResult,
};

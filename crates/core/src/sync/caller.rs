//! Retry and timeout boundary for outbound calls

use std::future::Future;
use std::time::Duration;

use syncbridge_common::resilience::{
    Jitter, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
};
use syncbridge_domain::{CallRetryConfig, Result, SyncBridgeError};

/// Retries only [`SyncBridgeError::Transient`] failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientOnly;

impl RetryPolicy<SyncBridgeError> for TransientOnly {
    fn should_retry(&self, error: &SyncBridgeError, _attempt: u32) -> RetryDecision {
        if error.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Wraps outbound calls with a per-attempt timeout and, for idempotent
/// reads, bounded retry of transient failures.
///
/// Exhausted retries surface the last error unchanged so callers can still
/// tell `NotFound` from `Transient`.
#[derive(Debug, Clone)]
pub struct RetryableCaller {
    executor: RetryExecutor<TransientOnly>,
    call_timeout: Duration,
}

impl RetryableCaller {
    pub fn new(config: RetryConfig, call_timeout: Duration) -> Self {
        Self { executor: RetryExecutor::new(config, TransientOnly), call_timeout }
    }

    pub fn from_config(config: &CallRetryConfig) -> Result<Self> {
        let retry = RetryConfig::builder()
            .max_attempts(config.max_attempts)
            .exponential_backoff(
                Duration::from_millis(config.initial_delay_ms),
                config.multiplier,
                Duration::from_millis(config.max_delay_ms),
            )
            .jitter(Jitter::Equal)
            .build()
            .map_err(|e| SyncBridgeError::Config(e.to_string()))?;
        Ok(Self::new(retry, Duration::from_millis(config.call_timeout_ms)))
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run an idempotent call, retrying transient failures.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.call_timeout;
        self.executor
            .execute(|| with_timeout(operation, timeout, call()))
            .await
            .map_err(|e| unwrap_retry_error(operation, e))
    }

    /// Run a non-idempotent call exactly once, bounded by the call timeout.
    pub async fn once<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        with_timeout(operation, self.call_timeout, call).await
    }
}

async fn with_timeout<T, Fut>(operation: &'static str, timeout: Duration, call: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncBridgeError::Transient(format!(
            "{operation} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

fn unwrap_retry_error(operation: &'static str, error: RetryError<SyncBridgeError>) -> SyncBridgeError {
    match error {
        RetryError::InvalidConfiguration { message } => SyncBridgeError::Config(message),
        other => other.into_last_error().unwrap_or_else(|| {
            SyncBridgeError::Transient(format!("{operation} exceeded its retry budget"))
        }),
    }
}

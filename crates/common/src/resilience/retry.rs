//! Bounded retry of async operations
//!
//! A [`RetryPolicy`] decides per error whether another attempt is worthwhile;
//! the executor only counts attempts and sleeps between them. When attempts
//! run out the last error is handed back so callers can still classify it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed, last error: {last:?}")]
    AttemptsExhausted { attempts: u32, last: E },

    /// The policy refused to retry this error
    #[error("non-retryable error: {error:?}")]
    NonRetryable { error: E },

    #[error("invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// Last error produced by the operation, if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { last, .. } => Some(last),
            Self::NonRetryable { error } => Some(error),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

pub type RetryResult<T, E> = Result<T, RetryError<E>>;

pub trait RetryPolicy<E> {
    /// `attempt` is zero-based: the first failure is attempt 0.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    Fixed(Duration),
    /// `initial_delay * base^attempt`, capped at `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let factor = base.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
                let millis = (initial_delay.as_millis() as f64 * factor)
                    .min(max_delay.as_millis() as f64);
                Duration::from_millis(millis as u64)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Uniform in `[delay / 2, delay]`
    Equal,
}

impl Jitter {
    pub fn apply(self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Equal => {
                let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                let half = millis / 2;
                let spread = rand::thread_rng().gen_range(0..=millis - half);
                Duration::from_millis(half + spread)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Equal,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), RetryError<()>> {
        let invalid = |message: &str| {
            Err(RetryError::InvalidConfiguration { message: message.to_string() })
        };
        if self.max_attempts == 0 {
            return invalid("max_attempts must be greater than 0");
        }
        match self.backoff {
            BackoffStrategy::Exponential { base, .. } if base <= 0.0 => {
                invalid("exponential base must be greater than 0")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn no_jitter(self) -> Self {
        self.jitter(Jitter::None)
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs an async operation until it succeeds, the policy stops it or the
/// attempts are spent.
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let attempts = attempt.saturating_add(1);
            if self.policy.should_retry(&error, attempt) == RetryDecision::Stop {
                debug!(error = ?error, "retry policy declined to retry");
                return Err(RetryError::NonRetryable { error });
            }
            if attempts >= self.config.max_attempts {
                warn!(attempts, error = ?error, "all retry attempts exhausted");
                return Err(RetryError::AttemptsExhausted { attempts, last: error });
            }

            let delay = self.config.jitter.apply(self.config.backoff.delay_for(attempt));
            warn!(attempt = attempts, delay = ?delay, error = ?error, "operation failed, retrying");
            tokio::time::sleep(delay).await;
            attempt = attempts;
        }
    }
}

//! Retry utilities for async operations
//!
//! Failures are classified through [`Retryable`]: only retryable errors are attempted
//! again, everything else surfaces after the first attempt.

use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Classification hook for errors passed through [`with_retry`]
pub trait Retryable {
    /// Whether another attempt could succeed
    fn is_retryable(&self) -> bool;
}

/// Configuration for retrying failed operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Delay before the first retry in seconds
    pub initial_interval: f64,

    /// Multiplier for the delay after each retry
    pub backoff_factor: f64,

    /// Upper bound on any single delay in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to delays
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a new retry policy with the given attempt ceiling
    ///
    /// Delays start at one second and double, capped at sixty, without jitter.
    ///
    /// ```rust
    /// use tooling::async_utils::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(3);
    /// assert_eq!(policy.max_attempts, 3);
    /// assert_eq!(policy.calculate_delay(1).as_secs(), 2);
    /// ```
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            initial_interval: 1.0,
            backoff_factor: 2.0,
            max_interval: 60.0,
            jitter: false,
        }
    }

    /// Set the delay before the first retry
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum delay
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay to wait before retry number `retry` (0-indexed)
    ///
    /// `initial_interval * backoff_factor ^ retry`, capped at `max_interval`. Jitter
    /// scales the capped value by a random factor in `0.5..=1.5`.
    pub fn calculate_delay(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.initial_interval * self.backoff_factor.powi(exponent);
        let capped = if base.is_finite() {
            base.min(self.max_interval)
        } else {
            self.max_interval
        };

        let delay = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };

        Duration::try_from_secs_f64(delay.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Check whether attempt number `attempt` (1-based) may be followed by another
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Final error of a retried operation
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Error returned by the last attempt
    pub error: E,

    /// Attempts made, including the failed one
    pub attempts: usize,

    /// True when the error was retryable but the attempt ceiling was reached
    pub exhausted: bool,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exhausted {
            write!(f, "{} (gave up after {} attempts)", self.error, self.attempts)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryFailure<E> {}

/// Execute an async operation with retry logic
///
/// The operation receives the 1-based attempt number. Retryable errors are retried
/// after the policy's backoff delay until `max_attempts` is reached; any other error
/// returns immediately. A policy with zero attempts still runs the operation once.
///
/// # Example
///
/// ```rust,ignore
/// let policy = RetryPolicy::new(3);
/// let body = with_retry(&policy, |attempt| fetch(url, attempt)).await?;
/// ```
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> std::result::Result<T, RetryFailure<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let ceiling = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_retryable() => {
                tracing::debug!(attempt, error = %error, "Attempt failed permanently");
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                    exhausted: false,
                });
            }
            Err(error) if attempt >= ceiling => {
                tracing::warn!(attempt, error = %error, "Retry attempts exhausted");
                return Err(RetryFailure {
                    error,
                    attempts: attempt,
                    exhausted: true,
                });
            }
            Err(error) => {
                let delay = policy.calculate_delay(attempt - 1);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

//! Timeout utilities for async operations

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A future did not finish before its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {limit:?}")]
pub struct TimedOut {
    /// The limit that was exceeded
    pub limit: Duration,
}

/// Run `future`, giving up once `limit` elapses
///
/// The future is dropped on timeout, which cancels any work it had in flight.
///
/// # Example
///
/// ```rust,ignore
/// let body = with_timeout(Duration::from_secs(120), response.text()).await??;
/// ```
pub async fn with_timeout<F>(limit: Duration, future: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TimedOut { limit })
}

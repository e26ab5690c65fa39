//! Async utilities for remote-call boundaries
//!
//! - `retry` - classified retry with exponential backoff
//! - `timeout` - per-attempt deadline wrapper
//!
//! # Example
//!
//! ```rust,ignore
//! use tooling::async_utils::retry::{with_retry, RetryPolicy};
//! use tooling::async_utils::timeout::with_timeout;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3).with_initial_interval(1.0);
//! let outcome = with_retry(&policy, |_attempt| async {
//!     with_timeout(Duration::from_secs(30), call_service())
//!         .await
//!         .unwrap_or_else(|timed_out| Err(ServiceError::from(timed_out)))
//! })
//! .await;
//! ```

pub mod retry;
pub mod timeout;

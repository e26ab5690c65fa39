//! Tooling utilities shared across the booksmith workspace
//!
//! # Modules
//!
//! - `rate_limit` - Rolling-window limiter that delays callers instead of rejecting them
//! - `async_utils` - Classified retry with exponential backoff, and a timeout wrapper
//! - `config` - Environment variable loading used by configuration layers

pub mod async_utils;
pub mod config;
pub mod rate_limit;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// An environment variable is set but unusable
    #[error("Invalid environment variable {key}: {reason}")]
    InvalidEnv { key: String, reason: String },
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

pub use async_utils::retry::{with_retry, RetryFailure, RetryPolicy, Retryable};
pub use async_utils::timeout::{with_timeout, TimedOut};
pub use rate_limit::RateLimiter;

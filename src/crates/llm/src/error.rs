//! Error types for chat backends.

use std::fmt;
use thiserror::Error;
use tooling::{Retryable, TimedOut};

/// Result type for backend construction and configuration.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Longest remote error body kept in an error detail.
const MAX_DETAIL_CHARS: usize = 512;

/// Whether a failed call may succeed if attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Network failure, timeout, rate limit or server error.
    Transient,
    /// Rejected request or unusable response.
    Permanent,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::Transient => write!(f, "transient"),
            ServiceErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// A classified failure of one remote call.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub detail: String,

    /// HTTP status, when the service answered.
    pub status: Option<u16>,

    /// Attempts made before this error surfaced.
    pub attempts: usize,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} service error", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        write!(f, ": {}", self.detail)?;
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        Ok(())
    }
}

impl ServiceError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Transient,
            detail: detail.into(),
            status: None,
            attempts: 1,
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Permanent,
            detail: detail.into(),
            status: None,
            attempts: 1,
        }
    }

    /// Classify an HTTP error status.
    ///
    /// 429 and 5xx are transient; every other status is permanent. The body is truncated
    /// before being kept.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = if status == 429 || (500..600).contains(&status) {
            ServiceErrorKind::Transient
        } else {
            ServiceErrorKind::Permanent
        };
        Self {
            kind,
            detail: truncate_detail(body),
            status: Some(status),
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ServiceErrorKind::Transient
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl From<TimedOut> for ServiceError {
    fn from(err: TimedOut) -> Self {
        ServiceError::transient(err.to_string())
    }
}

/// Shorten a remote error body for inclusion in an error detail.
pub fn truncate_detail(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= MAX_DETAIL_CHARS {
        return body.to_string();
    }
    let mut short: String = body.chars().take(MAX_DETAIL_CHARS).collect();
    short.push_str("...");
    short
}

/// Errors raised while building or configuring a backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API key not found in environment.
    #[error("API key not found: set the {0} environment variable")]
    ApiKeyNotFound(String),

    /// Invalid backend configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client could not be constructed.
    #[cfg(feature = "remote")]
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Run id unusable as a storage key
    #[error("Invalid run id '{0}': only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidRunId(String),

    /// Stored envelope written by an incompatible format
    #[error("Unsupported checkpoint format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Stored envelope does not match the requested run
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

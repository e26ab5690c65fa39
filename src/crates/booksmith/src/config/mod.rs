//! Configuration management
//!
//! [`BooksmithConfig`] is read from layered TOML files and environment variables by
//! [`ConfigLoader`], and turned into the pipeline's components by the helpers on the
//! schema type.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AssemblyConfig, BooksmithConfig, CheckpointConfig, ContextConfig, LimitsConfig, LlmConfig, LoggingConfig,
    RetryConfig, SchedulerSection,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Env(#[from] tooling::ToolingError),
}

//! Error types for the book pipeline
//!
//! [`PipelineError`] is the taxonomy every stage reports in; [`RunError`] adds the run,
//! stage and unit a failure belongs to.

use crate::model::Stage;
use checkpoint::CheckpointError;
use llm::{ServiceError, ServiceErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Kind of a pipeline failure, as recorded in checkpoints and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientService,
    PermanentService,
    Consistency,
    PartialCompletion,
    Persistence,
    Cancelled,
    Assembly,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientService => "transient_service",
            ErrorKind::PermanentService => "permanent_service",
            ErrorKind::Consistency => "consistency",
            ErrorKind::PartialCompletion => "partial_completion",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Assembly => "assembly",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by pipeline stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Remote call still failing after every retry
    #[error("{0}")]
    TransientService(ServiceError),

    /// Remote call rejected, or its response unusable
    #[error("{0}")]
    PermanentService(ServiceError),

    /// Pipeline invariant violated
    #[error("Consistency violation: {0}")]
    Consistency(String),

    /// Assembly requested while chapters are unfinished
    #[error("Chapters {incomplete:?} are not ready for assembly")]
    PartialCompletion { incomplete: Vec<u32> },

    /// Checkpoint could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] CheckpointError),

    /// Shutdown requested while the run was in progress
    #[error("Run cancelled")]
    Cancelled,

    /// E-book could not be written
    #[error("Assembly failed: {0}")]
    Assembly(#[from] crate::assembly::AssemblyError),

    /// Invalid configuration or input
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::TransientService(_) => ErrorKind::TransientService,
            PipelineError::PermanentService(_) => ErrorKind::PermanentService,
            PipelineError::Consistency(_) => ErrorKind::Consistency,
            PipelineError::PartialCompletion { .. } => ErrorKind::PartialCompletion,
            PipelineError::Persistence(_) => ErrorKind::Persistence,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Assembly(_) => ErrorKind::Assembly,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn consistency(detail: impl Into<String>) -> Self {
        PipelineError::Consistency(detail.into())
    }
}

impl From<ServiceError> for PipelineError {
    fn from(err: ServiceError) -> Self {
        match err.kind {
            ServiceErrorKind::Transient => PipelineError::TransientService(err),
            ServiceErrorKind::Permanent => PipelineError::PermanentService(err),
        }
    }
}

/// A pipeline failure attributed to a run
#[derive(Debug, Error)]
pub struct RunError {
    pub run_id: String,
    pub stage: Option<Stage>,

    /// Unit of work that failed, such as `chapter-3`
    pub unit: Option<String>,

    #[source]
    pub error: PipelineError,
}

impl RunError {
    pub fn new(run_id: impl Into<String>, error: PipelineError) -> Self {
        Self {
            run_id: run_id.into(),
            stage: None,
            unit: None,
            error,
        }
    }

    pub fn at(mut self, stage: Stage, unit: Option<String>) -> Self {
        self.stage = Some(stage);
        self.unit = unit;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}", self.run_id)?;
        if let Some(stage) = self.stage {
            write!(f, " failed at stage {}", stage)?;
        } else {
            write!(f, " failed")?;
        }
        if let Some(unit) = &self.unit {
            write!(f, " ({})", unit)?;
        }
        write!(f, " [{}]: {}", self.error.kind(), self.error)
    }
}

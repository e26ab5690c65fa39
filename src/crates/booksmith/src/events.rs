//! Progress events published while a run is driven
//!
//! Every event is logged through `tracing`. When an observer channel is attached the
//! event is also sent there; a closed channel is ignored.

use crate::error::ErrorKind;
use crate::model::{RunState, Stage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Event types for run progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        idea: String,
    },
    RunResumed {
        run_id: String,
        state: RunState,
        /// Chapters reopened after an earlier failure
        reopened: Vec<u32>,
    },
    StageStarted {
        run_id: String,
        stage: Stage,
    },
    StageCompleted {
        run_id: String,
        stage: Stage,
        duration_ms: u64,
    },
    /// Chapter handed to a worker, with the chapters its digest covers
    ChapterDispatched {
        run_id: String,
        chapter: u32,
        covered: Vec<u32>,
    },
    ChapterGenerated {
        run_id: String,
        chapter: u32,
        chars: usize,
    },
    ChapterFailed {
        run_id: String,
        chapter: u32,
        stage: Stage,
        kind: ErrorKind,
        error: String,
    },
    ChapterRefined {
        run_id: String,
        chapter: u32,
        chars: usize,
    },
    RunCompleted {
        run_id: String,
        artifact: PathBuf,
    },
    RunFailed {
        run_id: String,
        stage: Option<Stage>,
        kind: ErrorKind,
        error: String,
    },
}

impl PipelineEvent {
    pub fn run_id(&self) -> &str {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::RunResumed { run_id, .. }
            | PipelineEvent::StageStarted { run_id, .. }
            | PipelineEvent::StageCompleted { run_id, .. }
            | PipelineEvent::ChapterDispatched { run_id, .. }
            | PipelineEvent::ChapterGenerated { run_id, .. }
            | PipelineEvent::ChapterFailed { run_id, .. }
            | PipelineEvent::ChapterRefined { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::RunFailed { run_id, .. } => run_id,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PipelineEvent::RunStarted { run_id, .. } => format!("Run {} started", run_id),
            PipelineEvent::RunResumed { state, reopened, .. } => {
                if reopened.is_empty() {
                    format!("Run resumed at {}", state)
                } else {
                    format!("Run resumed at {}, reopened chapters {:?}", state, reopened)
                }
            }
            PipelineEvent::StageStarted { stage, .. } => format!("Stage {} started", stage),
            PipelineEvent::StageCompleted { stage, duration_ms, .. } => {
                format!("Stage {} completed ({}ms)", stage, duration_ms)
            }
            PipelineEvent::ChapterDispatched { chapter, covered, .. } => {
                format!("Chapter {} dispatched with context of {} chapters", chapter, covered.len())
            }
            PipelineEvent::ChapterGenerated { chapter, chars, .. } => {
                format!("Chapter {} generated ({} chars)", chapter, chars)
            }
            PipelineEvent::ChapterFailed { chapter, stage, error, .. } => {
                format!("Chapter {} failed during {}: {}", chapter, stage, error)
            }
            PipelineEvent::ChapterRefined { chapter, chars, .. } => {
                format!("Chapter {} refined ({} chars)", chapter, chars)
            }
            PipelineEvent::RunCompleted { artifact, .. } => {
                format!("Run completed: {}", artifact.display())
            }
            PipelineEvent::RunFailed { kind, error, .. } => format!("Run failed [{}]: {}", kind, error),
        }
    }
}

/// Publishes events to the log and an optional observer
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    observer: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    /// Sink that only logs
    pub fn logging_only() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// Sink plus the receiving end of its observer channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_observer(tx), rx)
    }

    pub fn emit(&self, event: PipelineEvent) {
        tracing::debug!(
            run_id = %event.run_id(),
            description = %event.description(),
            "Pipeline event"
        );
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }
}

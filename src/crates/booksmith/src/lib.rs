//! # Booksmith
//!
//! Turns a short book idea into a generated, revised e-book by chaining calls to a
//! remote text-generation service.
//!
//! ## Features
//!
//! - **Stage pipeline** - Concept, Outline, Chapters, Refinement and Assembly, each
//!   checkpointed before the run advances
//! - **Resumable runs** - `resume` re-enters at the stored state and never repeats
//!   completed work
//! - **Consistent context** - each chapter is written against a bounded digest of the
//!   chapters before it
//! - **Bounded concurrency** - chapters are generated by a worker pool that shares one
//!   rate limiter
//! - **EPUB output** - the finished book is packaged with `epub-builder`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use booksmith::{EpubAssembler, PipelineOrchestrator};
//! use checkpoint::FileCheckpointStore;
//! use llm::fixture::FixtureBackend;
//! use llm::RetryingClient;
//! use std::sync::Arc;
//! use tooling::{RateLimiter, RetryPolicy};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let backend = Arc::new(FixtureBackend::new("fixtures"));
//! let client = RetryingClient::new(backend, RateLimiter::per_minute(20), RetryPolicy::new(3));
//! let orchestrator = PipelineOrchestrator::new(
//!     client,
//!     Arc::new(FileCheckpointStore::new(".booksmith/checkpoints")),
//!     Arc::new(EpubAssembler::new()),
//! );
//!
//! let report = orchestrator.start("A lighthouse keeper finds a map").await?;
//! println!("{:?}", report.artifact);
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod persist;
pub mod prompts;
pub mod response;
pub mod scheduler;
pub mod shutdown;
pub mod summarizer;

pub use assembly::{AssemblyError, BookAssembler, BookMetadata, BookSection, EpubAssembler};
pub use config::{BooksmithConfig, ConfigError, ConfigLoader};
pub use error::{ErrorKind, PipelineError, Result, RunError};
pub use events::{EventSink, PipelineEvent};
pub use model::{BookRun, ChapterRecord, ChapterStatus, Concept, Outline, OutlineEntry, RunState, Stage};
pub use orchestrator::{PipelineOrchestrator, PipelineSettings, RunReport};
pub use persist::RunCheckpointer;
pub use scheduler::{ChapterScheduler, FrontierPolicy, ScheduleError, ScheduleReport, SchedulerConfig};
pub use shutdown::ShutdownCoordinator;
pub use summarizer::{ContextDigest, ContextSummarizer, ExtractiveSummarizer};

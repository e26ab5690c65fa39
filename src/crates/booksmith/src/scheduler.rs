//! Bounded-concurrency chapter generation
//!
//! Chapters are dispatched to a pool of at most `concurrency` workers. A chapter may
//! start only once every chapter it depends on has text, and it is written against a
//! digest of every lower-numbered chapter complete at dispatch time. Each finished
//! chapter is checkpointed before the next completion is looked at.

use crate::error::PipelineError;
use crate::events::{EventSink, PipelineEvent};
use crate::model::{BookRun, ChapterPhase, ChapterRecord, ChapterStatus, Stage};
use crate::persist::RunCheckpointer;
use crate::prompts::{self, PromptSettings};
use crate::shutdown::ShutdownCoordinator;
use crate::summarizer::{ContextDigest, ContextSummarizer};
use llm::{ChatResponse, RetryingClient, ServiceError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Which chapters may run at the same time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierPolicy {
    /// A chapter waits for every lower-numbered chapter
    #[default]
    Strict,

    /// Chapters are grouped into waves of `concurrency`; a chapter waits for every
    /// earlier wave
    Wave,
}

impl FrontierPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrontierPolicy::Strict => "strict",
            FrontierPolicy::Wave => "wave",
        }
    }
}

impl fmt::Display for FrontierPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrontierPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(FrontierPolicy::Strict),
            "wave" => Ok(FrontierPolicy::Wave),
            other => Err(format!("unknown frontier policy '{}', expected strict or wave", other)),
        }
    }
}

/// Configuration for the chapter scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum chapters in flight
    pub concurrency: usize,

    /// Minimum gap between two dispatches
    pub stagger: Duration,

    pub frontier: FrontierPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            stagger: Duration::from_millis(500),
            frontier: FrontierPolicy::Strict,
        }
    }
}

/// Outcome of one scheduling pass
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Chapters generated during this pass, in completion order
    pub generated: Vec<u32>,

    /// Chapters whose generation failed, in completion order
    pub failed: Vec<(u32, ServiceError)>,

    /// Chapters left pending behind a failure
    pub blocked: Vec<u32>,
}

impl ScheduleReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// A scheduling pass that stopped before every chapter was looked at
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ScheduleError {
    /// Chapter being recorded, or the lowest chapter in flight, when the pass stopped
    pub chapter: Option<u32>,
    #[source]
    pub error: PipelineError,
}

impl ScheduleError {
    fn at(chapter: u32, error: impl Into<PipelineError>) -> Self {
        Self {
            chapter: Some(chapter),
            error: error.into(),
        }
    }

    fn cancelled(in_flight: &HashSet<u32>) -> Self {
        Self {
            chapter: in_flight.iter().min().copied(),
            error: PipelineError::Cancelled,
        }
    }
}

impl From<PipelineError> for ScheduleError {
    fn from(error: PipelineError) -> Self {
        Self { chapter: None, error }
    }
}

type WorkerOutcome = (u32, std::result::Result<ChatResponse, ServiceError>);

/// Generates the chapters of a run
pub struct ChapterScheduler {
    client: RetryingClient,
    summarizer: Arc<dyn ContextSummarizer>,
    prompts: PromptSettings,
    config: SchedulerConfig,
    events: EventSink,
    shutdown: ShutdownCoordinator,
}

impl ChapterScheduler {
    pub fn new(client: RetryingClient, summarizer: Arc<dyn ContextSummarizer>, config: SchedulerConfig) -> Self {
        Self {
            client,
            summarizer,
            prompts: PromptSettings::default(),
            config,
            events: EventSink::default(),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptSettings) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Chapters that must have text before `number` may start
    pub fn dependencies(&self, number: u32) -> Vec<u32> {
        let upto = match self.config.frontier {
            FrontierPolicy::Strict => number.saturating_sub(1),
            FrontierPolicy::Wave => {
                let width = self.config.concurrency.max(1) as u32;
                (number.saturating_sub(1) / width) * width
            }
        };
        (1..=upto).collect()
    }

    fn is_eligible(&self, run: &BookRun, number: u32) -> bool {
        self.dependencies(number)
            .iter()
            .all(|dep| run.chapter(*dep).is_some_and(ChapterRecord::is_complete))
    }

    /// Digest of every chapter below `number` that currently has text
    fn digest_for(&self, run: &BookRun, number: u32) -> ContextDigest {
        let prior: Vec<&ChapterRecord> = run
            .chapters
            .iter()
            .filter(|c| c.number < number && c.is_complete())
            .collect();
        self.summarizer.digest(&prior)
    }

    /// Confirm the dependency set of `number` is complete and inside its digest
    fn check_dispatch(&self, run: &BookRun, number: u32, digest: &ContextDigest) -> Result<(), PipelineError> {
        for dep in self.dependencies(number) {
            let ready = run.chapter(dep).is_some_and(ChapterRecord::is_complete);
            if !ready || !digest.covered.contains(&dep) {
                return Err(PipelineError::consistency(format!(
                    "chapter {} dispatched before chapter {} was in its context",
                    number, dep
                )));
            }
        }
        Ok(())
    }

    /// Generate every pending chapter of `run`
    ///
    /// Returns once no chapter can make progress. A failed chapter is recorded on the
    /// run and stops further dispatch; chapters already in flight are still collected.
    /// On shutdown in-flight work is abandoned, those chapters stay pending, and
    /// [`PipelineError::Cancelled`] is returned. A checkpoint that cannot be written
    /// stops the pass at once with the chapter it was recording.
    pub async fn run(&self, run: &mut BookRun, checkpointer: &RunCheckpointer) -> Result<ScheduleReport, ScheduleError> {
        run.seed_chapters()?;
        let concept = run
            .concept
            .clone()
            .ok_or_else(|| PipelineError::consistency("chapters requested before the concept"))?;
        let outline = run
            .outline
            .clone()
            .ok_or_else(|| PipelineError::consistency("chapters requested before the outline"))?;

        let concurrency = self.config.concurrency.max(1);
        let mut report = ScheduleReport::default();
        let mut tasks: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut in_flight: HashSet<u32> = HashSet::new();
        let mut last_dispatch: Option<Instant> = None;
        let mut halted = run.chapters.iter().any(|c| c.status == ChapterStatus::Failed);

        info!(
            run_id = %run.run_id,
            chapters = outline.len(),
            pending = run.count_with(ChapterStatus::Pending),
            concurrency,
            frontier = %self.config.frontier,
            "Scheduling chapters"
        );

        loop {
            if self.shutdown.is_shutdown_requested() {
                tasks.abort_all();
                return Err(ScheduleError::cancelled(&in_flight));
            }

            if !halted {
                let ready: Vec<u32> = run
                    .chapters
                    .iter()
                    .filter(|c| c.status == ChapterStatus::Pending && !in_flight.contains(&c.number))
                    .map(|c| c.number)
                    .filter(|n| self.is_eligible(run, *n))
                    .collect();

                for number in ready {
                    if tasks.len() >= concurrency {
                        break;
                    }

                    if let Some(previous) = last_dispatch {
                        let due = previous + self.config.stagger;
                        if Instant::now() < due {
                            tokio::select! {
                                _ = tokio::time::sleep_until(due) => {}
                                _ = self.shutdown.cancelled() => {
                                    tasks.abort_all();
                                    return Err(ScheduleError::cancelled(&in_flight));
                                }
                            }
                        }
                    }

                    let entry = outline
                        .entry(number)
                        .ok_or_else(|| PipelineError::consistency(format!("chapter {} is not in the outline", number)))?;
                    let digest = self.digest_for(run, number);
                    self.check_dispatch(run, number, &digest)
                        .map_err(|e| ScheduleError::at(number, e))?;

                    let request = prompts::chapter_request(&concept, &outline, entry, &digest, &self.prompts);
                    let client = self.client.clone();
                    tasks.spawn(async move { (number, client.invoke(request).await) });

                    in_flight.insert(number);
                    last_dispatch = Some(Instant::now());
                    debug!(run_id = %run.run_id, chapter = number, covered = ?digest.covered, "Chapter dispatched");
                    self.events.emit(PipelineEvent::ChapterDispatched {
                        run_id: run.run_id.clone(),
                        chapter: number,
                        covered: digest.covered,
                    });
                }
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tasks.abort_all();
                    return Err(ScheduleError::cancelled(&in_flight));
                }
                joined = tasks.join_next() => joined,
            };

            let (number, outcome) = match joined {
                Some(Ok(done)) => done,
                Some(Err(e)) => {
                    tasks.abort_all();
                    return Err(PipelineError::consistency(format!("chapter worker stopped: {}", e)).into());
                }
                None => break,
            };
            in_flight.remove(&number);

            let chapter = run
                .chapter_mut(number)
                .ok_or_else(|| PipelineError::consistency(format!("no record for chapter {}", number)))?;

            match outcome {
                Ok(response) => {
                    let chars = response.text.chars().count();
                    chapter
                        .mark_generated(response.text)
                        .map_err(|e| ScheduleError::at(number, e))?;
                    checkpointer.save(run).await.map_err(|e| ScheduleError::at(number, e))?;
                    info!(run_id = %run.run_id, chapter = number, chars, "Chapter generated");
                    self.events.emit(PipelineEvent::ChapterGenerated {
                        run_id: run.run_id.clone(),
                        chapter: number,
                        chars,
                    });
                    report.generated.push(number);
                }
                Err(error) => {
                    let kind = PipelineError::from(error.clone()).kind();
                    chapter
                        .mark_failed(ChapterPhase::Generation, kind, error.to_string())
                        .map_err(|e| ScheduleError::at(number, e))?;
                    checkpointer.save(run).await.map_err(|e| ScheduleError::at(number, e))?;
                    warn!(
                        run_id = %run.run_id,
                        chapter = number,
                        attempts = error.attempts,
                        error = %error,
                        "Chapter generation failed"
                    );
                    self.events.emit(PipelineEvent::ChapterFailed {
                        run_id: run.run_id.clone(),
                        chapter: number,
                        stage: Stage::Chapters,
                        kind,
                        error: error.to_string(),
                    });
                    report.failed.push((number, error));
                    halted = true;
                }
            }
        }

        report.blocked = run
            .chapters
            .iter()
            .filter(|c| c.status == ChapterStatus::Pending)
            .map(|c| c.number)
            .collect();

        if !report.blocked.is_empty() {
            info!(
                run_id = %run.run_id,
                blocked = ?report.blocked,
                "Chapters left pending behind a failure"
            );
        }
        Ok(report)
    }
}

//! The stage pipeline
//!
//! [`PipelineOrchestrator`] drives a [`BookRun`] through
//! `Created -> ConceptDone -> OutlineDone -> ChaptersDone -> RefinementDone -> AssemblyDone`.
//! Every completed stage, and every chapter inside the chapter and refinement stages, is
//! checkpointed before the run moves on. A failure is recorded on the run and persisted
//! before it is reported, so any failed run can be resumed.

use crate::assembly::{slugify, BookAssembler, BookMetadata, BookSection};
use crate::error::{PipelineError, RunError};
use crate::events::{EventSink, PipelineEvent};
use crate::model::{BookRun, ChapterPhase, ChapterStatus, RunState, Stage};
use crate::persist::RunCheckpointer;
use crate::prompts::{self, PromptSettings};
use crate::response::{parse_concept, parse_outline};
use crate::scheduler::{ChapterScheduler, ScheduleError, SchedulerConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::summarizer::{ContextSummarizer, ExtractiveSummarizer};
use checkpoint::CheckpointStore;
use llm::{ChatRequest, ChatResponse, RetryingClient};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Run-level behaviour
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub prompts: PromptSettings,
    pub scheduler: SchedulerConfig,

    /// Assemble chapters without refined text from their raw text
    pub accept_unrefined: bool,

    /// Directory the e-book is written to
    pub output_dir: PathBuf,

    pub author: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            prompts: PromptSettings::default(),
            scheduler: SchedulerConfig::default(),
            accept_unrefined: false,
            output_dir: PathBuf::from("books"),
            author: "Booksmith".to_string(),
        }
    }
}

/// Summary of a run, as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: RunState,
    pub title: Option<String>,
    pub artifact: Option<PathBuf>,
    pub chapters: usize,
    pub refined: usize,

    /// Chapters without refined text
    pub unrefined: usize,
}

impl RunReport {
    pub fn from_run(run: &BookRun) -> Self {
        let refined = run.count_with(ChapterStatus::Refined);
        Self {
            run_id: run.run_id.clone(),
            state: run.state,
            title: run.concept.as_ref().map(|c| c.title.clone()),
            artifact: run.artifact.clone(),
            chapters: run.chapters.len(),
            refined,
            unrefined: run.chapters.len() - refined,
        }
    }
}

/// Error of one stage, with the unit of work it belongs to
struct StageError {
    unit: Option<String>,
    error: PipelineError,
}

impl StageError {
    fn at(unit: impl Into<String>, error: impl Into<PipelineError>) -> Self {
        Self {
            unit: Some(unit.into()),
            error: error.into(),
        }
    }
}

impl From<ScheduleError> for StageError {
    fn from(failure: ScheduleError) -> Self {
        Self {
            unit: failure.chapter.map(prompts::chapter_tag),
            error: failure.error,
        }
    }
}

impl From<PipelineError> for StageError {
    fn from(error: PipelineError) -> Self {
        Self { unit: None, error }
    }
}

type StageResult = std::result::Result<(), StageError>;

/// Top-level stage state machine
pub struct PipelineOrchestrator {
    client: RetryingClient,
    checkpointer: RunCheckpointer,
    summarizer: Arc<dyn ContextSummarizer>,
    assembler: Arc<dyn BookAssembler>,
    settings: PipelineSettings,
    events: EventSink,
    shutdown: ShutdownCoordinator,
}

impl PipelineOrchestrator {
    pub fn new(client: RetryingClient, store: Arc<dyn CheckpointStore>, assembler: Arc<dyn BookAssembler>) -> Self {
        Self {
            client,
            checkpointer: RunCheckpointer::new(store),
            summarizer: Arc::new(ExtractiveSummarizer::default()),
            assembler,
            settings: PipelineSettings::default(),
            events: EventSink::default(),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ContextSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
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

    pub fn checkpointer(&self) -> &RunCheckpointer {
        &self.checkpointer
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Create a run for `idea` and drive it to completion
    pub async fn start(&self, idea: &str) -> Result<RunReport, RunError> {
        let mut run = BookRun::new(idea.trim());
        if run.idea.is_empty() {
            return Err(RunError::new(run.run_id, PipelineError::Config("the book idea is empty".into())));
        }

        self.checkpointer
            .save(&mut run)
            .await
            .map_err(|e| RunError::new(run.run_id.clone(), e))?;

        info!(run_id = %run.run_id, "Run started");
        self.events.emit(PipelineEvent::RunStarted {
            run_id: run.run_id.clone(),
            idea: run.idea.clone(),
        });

        self.drive(run).await
    }

    /// Continue a stored run from its latest checkpoint
    ///
    /// Completed work is never repeated: chapters that already have text are not
    /// generated again, refined chapters are not refined again, and a run that was
    /// already assembled is reported as is.
    pub async fn resume(&self, run_id: &str) -> Result<RunReport, RunError> {
        let mut run = self
            .checkpointer
            .load(run_id)
            .await
            .map_err(|e| RunError::new(run_id, e))?
            .ok_or_else(|| RunError::new(run_id, PipelineError::Config(format!("no checkpoint for run {}", run_id))))?;

        if run.state == RunState::AssemblyDone {
            info!(run_id = %run.run_id, "Run already assembled");
            return Ok(RunReport::from_run(&run));
        }

        let reopened = run.prepare_resume();
        self.checkpointer
            .save(&mut run)
            .await
            .map_err(|e| RunError::new(run.run_id.clone(), e))?;

        info!(run_id = %run.run_id, state = %run.state, reopened = ?reopened, "Run resumed");
        self.events.emit(PipelineEvent::RunResumed {
            run_id: run.run_id.clone(),
            state: run.state,
            reopened,
        });

        self.drive(run).await
    }

    /// Latest stored snapshot of a run
    pub async fn status(&self, run_id: &str) -> Result<Option<BookRun>, PipelineError> {
        self.checkpointer.load(run_id).await
    }

    async fn drive(&self, mut run: BookRun) -> Result<RunReport, RunError> {
        while let Some(stage) = run.state.next_stage() {
            if self.shutdown.is_shutdown_requested() {
                return self.fail(&mut run, stage, None, PipelineError::Cancelled).await;
            }

            info!(run_id = %run.run_id, stage = %stage, "Stage started");
            self.events.emit(PipelineEvent::StageStarted {
                run_id: run.run_id.clone(),
                stage,
            });
            let started = Instant::now();

            if let Err(failure) = self.run_stage(&mut run, stage).await {
                return self.fail(&mut run, stage, failure.unit, failure.error).await;
            }
            if let Err(e) = run.complete_stage(stage) {
                return self.fail(&mut run, stage, None, e).await;
            }
            if let Err(e) = self.checkpointer.save(&mut run).await {
                return self.fail(&mut run, stage, None, e).await;
            }

            let duration_ms = started.elapsed().as_millis() as u64;
            info!(run_id = %run.run_id, stage = %stage, duration_ms, "Stage completed");
            self.events.emit(PipelineEvent::StageCompleted {
                run_id: run.run_id.clone(),
                stage,
                duration_ms,
            });
        }

        if run.state != RunState::AssemblyDone {
            return Err(RunError::new(
                run.run_id.clone(),
                PipelineError::consistency(format!("run stopped in state {}", run.state)),
            ));
        }

        let report = RunReport::from_run(&run);
        if let Some(artifact) = &run.artifact {
            info!(run_id = %run.run_id, artifact = %artifact.display(), "Run completed");
            self.events.emit(PipelineEvent::RunCompleted {
                run_id: run.run_id.clone(),
                artifact: artifact.clone(),
            });
        }
        Ok(report)
    }

    async fn run_stage(&self, run: &mut BookRun, stage: Stage) -> StageResult {
        match stage {
            Stage::Concept => self.concept_stage(run).await,
            Stage::Outline => self.outline_stage(run).await,
            Stage::Chapters => self.chapters_stage(run).await,
            Stage::Refinement => self.refinement_stage(run).await,
            Stage::Assembly => self.assembly_stage(run).await,
        }
    }

    /// One remote call, abandoned on shutdown
    async fn call(&self, request: ChatRequest) -> Result<ChatResponse, PipelineError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(PipelineError::Cancelled),
            result = self.client.invoke(request) => result.map_err(PipelineError::from),
        }
    }

    async fn concept_stage(&self, run: &mut BookRun) -> StageResult {
        let request = prompts::concept_request(&run.idea, &self.settings.prompts);
        let response = self.call(request).await.map_err(|e| StageError::at("concept", e))?;
        let concept = parse_concept(&response.text).map_err(|e| StageError::at("concept", e))?;

        info!(
            run_id = %run.run_id,
            title = %concept.title,
            target_chapters = concept.target_chapters,
            "Concept accepted"
        );
        run.concept = Some(concept);
        Ok(())
    }

    async fn outline_stage(&self, run: &mut BookRun) -> StageResult {
        let concept = run
            .concept
            .as_ref()
            .ok_or_else(|| PipelineError::consistency("outline requested before the concept"))?;

        let request = prompts::outline_request(&run.idea, concept, &self.settings.prompts);
        let response = self.call(request).await.map_err(|e| StageError::at("outline", e))?;
        let outline = parse_outline(&response.text).map_err(|e| StageError::at("outline", e))?;

        if outline.len() != concept.target_chapters as usize {
            warn!(
                run_id = %run.run_id,
                planned = concept.target_chapters,
                outlined = outline.len(),
                "Outline chapter count differs from the concept"
            );
        }
        info!(run_id = %run.run_id, chapters = outline.len(), "Outline accepted");

        run.outline = Some(outline);
        run.chapters.clear();
        run.seed_chapters()?;
        Ok(())
    }

    async fn chapters_stage(&self, run: &mut BookRun) -> StageResult {
        let scheduler = ChapterScheduler::new(
            self.client.clone(),
            self.summarizer.clone(),
            self.settings.scheduler.clone(),
        )
        .with_prompts(self.settings.prompts.clone())
        .with_events(self.events.clone())
        .with_shutdown(self.shutdown.clone());

        let report = scheduler.run(run, &self.checkpointer).await?;

        if let Some((number, error)) = report.failed.first() {
            return Err(StageError::at(prompts::chapter_tag(*number), error.clone()));
        }
        if !report.blocked.is_empty() {
            return Err(PipelineError::PartialCompletion {
                incomplete: report.blocked,
            }
            .into());
        }
        Ok(())
    }

    async fn refinement_stage(&self, run: &mut BookRun) -> StageResult {
        let (concept, outline) = match (&run.concept, &run.outline) {
            (Some(concept), Some(outline)) => (concept.clone(), outline.clone()),
            _ => return Err(PipelineError::consistency("refinement requested before the outline").into()),
        };

        let missing: Vec<u32> = run
            .chapters
            .iter()
            .filter(|c| c.raw_text.is_none())
            .map(|c| c.number)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::consistency(format!("chapters {:?} have no text to refine", missing)).into());
        }

        let queue: Vec<u32> = run
            .chapters
            .iter()
            .filter(|c| c.status == ChapterStatus::Generated)
            .map(|c| c.number)
            .collect();

        for number in queue {
            let tag = prompts::refine_tag(number);
            if self.shutdown.is_shutdown_requested() {
                return Err(StageError::at(tag, PipelineError::Cancelled));
            }

            let entry = outline
                .entry(number)
                .ok_or_else(|| PipelineError::consistency(format!("chapter {} is not in the outline", number)))?;
            let raw_text = run
                .chapter(number)
                .and_then(|c| c.raw_text.clone())
                .unwrap_or_default();

            let request = prompts::refine_request(&concept, entry, &raw_text, &self.settings.prompts);
            let outcome = self.call(request).await;

            let chapter = run
                .chapter_mut(number)
                .ok_or_else(|| PipelineError::consistency(format!("no record for chapter {}", number)))?;

            match outcome {
                Ok(response) => {
                    let chars = response.text.chars().count();
                    chapter.mark_refined(response.text).map_err(|e| StageError::at(&tag, e))?;
                    self.checkpointer.save(run).await.map_err(|e| StageError::at(&tag, e))?;
                    info!(run_id = %run.run_id, chapter = number, chars, "Chapter refined");
                    self.events.emit(PipelineEvent::ChapterRefined {
                        run_id: run.run_id.clone(),
                        chapter: number,
                        chars,
                    });
                }
                Err(PipelineError::Cancelled) => return Err(StageError::at(tag, PipelineError::Cancelled)),
                Err(error) => {
                    chapter
                        .mark_failed(ChapterPhase::Refinement, error.kind(), error.to_string())
                        .map_err(|e| StageError::at(&tag, e))?;
                    self.checkpointer.save(run).await.map_err(|e| StageError::at(&tag, e))?;
                    warn!(run_id = %run.run_id, chapter = number, error = %error, "Chapter refinement failed");
                    self.events.emit(PipelineEvent::ChapterFailed {
                        run_id: run.run_id.clone(),
                        chapter: number,
                        stage: Stage::Refinement,
                        kind: error.kind(),
                        error: error.to_string(),
                    });

                    if !self.settings.accept_unrefined {
                        return Err(StageError::at(tag, error));
                    }
                }
            }
        }
        Ok(())
    }

    async fn assembly_stage(&self, run: &mut BookRun) -> StageResult {
        let concept = run
            .concept
            .as_ref()
            .ok_or_else(|| PipelineError::consistency("assembly requested before the concept"))?;

        let accept_unrefined = self.settings.accept_unrefined;
        let incomplete: Vec<u32> = run
            .chapters
            .iter()
            .filter(|c| {
                let usable = c.status == ChapterStatus::Refined || (accept_unrefined && c.raw_text.is_some());
                !usable
            })
            .map(|c| c.number)
            .collect();
        if run.chapters.is_empty() || !incomplete.is_empty() {
            return Err(PipelineError::PartialCompletion { incomplete }.into());
        }

        let metadata = BookMetadata {
            title: concept.title.clone(),
            author: self.settings.author.clone(),
            description: concept.subtitle.clone(),
        };
        let sections: Vec<BookSection> = run
            .chapters
            .iter()
            .map(|c| BookSection {
                title: format!("Chapter {}: {}", c.number, c.title),
                content: c.best_text().unwrap_or_default().to_string(),
            })
            .collect();
        let output = self
            .settings
            .output_dir
            .join(format!("{}.epub", slugify(&concept.title)));

        let written = self
            .assembler
            .assemble(&metadata, &sections, &output)
            .await
            .map_err(|e| StageError::at("assembly", e))?;

        info!(run_id = %run.run_id, artifact = %written.display(), "Book assembled");
        run.artifact = Some(written);
        Ok(())
    }

    /// Record `error` on the run, persist it, and report it
    ///
    /// If the failure itself cannot be persisted, that persistence error is reported
    /// instead.
    async fn fail(
        &self,
        run: &mut BookRun,
        stage: Stage,
        unit: Option<String>,
        error: PipelineError,
    ) -> Result<RunReport, RunError> {
        run.fail(stage, unit.clone(), error.kind(), error.to_string());

        let error = match self.checkpointer.save(run).await {
            Ok(()) => error,
            Err(persist) => {
                error!(
                    run_id = %run.run_id,
                    original = %error,
                    error = %persist,
                    "Failed to record run failure"
                );
                persist
            }
        };

        error!(
            run_id = %run.run_id,
            stage = %stage,
            unit = unit.as_deref().unwrap_or("-"),
            kind = %error.kind(),
            error = %error,
            "Run failed"
        );
        self.events.emit(PipelineEvent::RunFailed {
            run_id: run.run_id.clone(),
            stage: Some(stage),
            kind: error.kind(),
            error: error.to_string(),
        });

        Err(RunError::new(run.run_id.clone(), error).at(stage, unit))
    }
}

//! Shared helpers for booksmith integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use booksmith::response::{parse_concept, parse_outline};
use booksmith::{
    AssemblyError, BookAssembler, BookMetadata, BookRun, BookSection, ChapterRecord, ContextDigest,
    ContextSummarizer, ExtractiveSummarizer, FrontierPolicy, PipelineOrchestrator, PipelineSettings,
    SchedulerConfig,
};
use checkpoint::{Checkpoint, CheckpointError, CheckpointStore, CheckpointSummary, InMemoryCheckpointStore};
use llm::{ChatBackend, ChatRequest, ChatResponse, RetryingClient, ServiceError};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tooling::{RateLimiter, RetryPolicy};

pub const BOOK_TITLE: &str = "The Lantern Map";

pub fn concept_json(chapters: u32) -> String {
    format!(
        r#"{{
  "expanded_title": "{}",
  "subtitle": "A keeper, a map and a coast that moves",
  "target_audience": {{"primary": "Adult readers of quiet mysteries"}},
  "core_themes": ["solitude", "inheritance"],
  "genre_classification": {{"primary": "Mystery", "tone": "Wistful"}},
  "word_count": 60000,
  "chapter_structure": {{"total_chapters": {}}},
  "unique_selling_proposition": "A map that redraws itself."
}}"#,
        BOOK_TITLE, chapters
    )
}

pub fn outline_json(chapters: u32) -> String {
    let entries: Vec<String> = (1..=chapters)
        .map(|n| {
            format!(
                r#"{{"number": {n}, "title": "Part {n}", "plot_points": ["Beat {n}a", "Beat {n}b"], "target_words": 1500}}"#
            )
        })
        .collect();
    format!(r#"{{"chapters": [{}]}}"#, entries.join(", "))
}

pub fn chapter_text(number: u32) -> String {
    format!(
        "Chapter {number} opens on the headland.\n\nBy nightfall the events of chapter {number} have settled."
    )
}

pub fn refined_text(number: u32) -> String {
    format!("Polished chapter {number}.\n\nEvery line of chapter {number} now reads cleanly.")
}

/// Backend answering every tag with a sensible default, unless a script says otherwise
///
/// Records each call's tag in call order and tracks how many calls overlap.
pub struct ScriptedBackend {
    chapters: u32,
    scripts: Mutex<HashMap<String, VecDeque<Result<ChatResponse, ServiceError>>>>,
    delays: Mutex<HashMap<String, Duration>>,
    default_delay: Duration,
    calls: Mutex<Vec<ChatRequest>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(chapters: u32) -> Self {
        Self {
            chapters,
            scripts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            default_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every call takes `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Calls for `tag` take `delay` before answering
    pub fn delay_tag(&self, tag: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(tag.to_string(), delay);
    }

    /// Answer the next calls for `tag` with `outcomes`, then fall back to the default
    pub fn script(&self, tag: &str, outcomes: Vec<Result<ChatResponse, ServiceError>>) {
        self.scripts.lock().unwrap().insert(tag.to_string(), outcomes.into());
    }

    /// Fail every call for `tag` with `error`
    pub fn fail_always(&self, tag: &str, error: ServiceError) {
        self.script(tag, vec![Err(error); 32]);
    }

    pub fn clear_script(&self, tag: &str) {
        self.scripts.lock().unwrap().remove(tag);
    }

    pub fn tags(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|r| r.tag.clone()).collect()
    }

    pub fn requests_for(&self, tag: &str) -> Vec<ChatRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tag == tag)
            .cloned()
            .collect()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.tags().iter().filter(|t| t.starts_with(prefix)).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn default_answer(&self, tag: &str) -> Result<ChatResponse, ServiceError> {
        let number = |prefix: &str| tag.strip_prefix(prefix).and_then(|n| n.parse::<u32>().ok());
        if tag == "concept" {
            Ok(ChatResponse::text(concept_json(self.chapters)))
        } else if tag == "outline" {
            Ok(ChatResponse::text(outline_json(self.chapters)))
        } else if let Some(n) = number("chapter-") {
            Ok(ChatResponse::text(chapter_text(n)))
        } else if let Some(n) = number("refine-") {
            Ok(ChatResponse::text(refined_text(n)))
        } else {
            Err(ServiceError::permanent(format!("unexpected tag {}", tag)))
        }
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ServiceError> {
        let tag = request.tag.clone();
        self.calls.lock().unwrap().push(request);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(&tag)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&tag)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| self.default_answer(&tag))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Assembler recording what it was asked to write, without touching the filesystem
#[derive(Default)]
pub struct RecordingAssembler {
    pub books: Mutex<Vec<(BookMetadata, Vec<BookSection>, PathBuf)>>,
}

impl RecordingAssembler {
    pub fn count(&self) -> usize {
        self.books.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(BookMetadata, Vec<BookSection>, PathBuf)> {
        self.books.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BookAssembler for RecordingAssembler {
    async fn assemble(
        &self,
        metadata: &BookMetadata,
        sections: &[BookSection],
        output: &Path,
    ) -> Result<PathBuf, AssemblyError> {
        self.books
            .lock()
            .unwrap()
            .push((metadata.clone(), sections.to_vec(), output.to_path_buf()));
        Ok(output.to_path_buf())
    }
}

/// In-memory store whose saves start failing once `healthy_saves` have succeeded
pub struct FailingStore {
    inner: InMemoryCheckpointStore,
    healthy_saves: usize,
    saves: AtomicUsize,
}

impl FailingStore {
    pub fn after(healthy_saves: usize) -> Self {
        Self {
            inner: InMemoryCheckpointStore::new(),
            healthy_saves,
            saves: AtomicUsize::new(0),
        }
    }

    /// Save attempts so far, including rejected ones
    pub fn attempts(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointStore for FailingStore {
    async fn save(&self, checkpoint: &Checkpoint) -> checkpoint::Result<()> {
        if self.saves.fetch_add(1, Ordering::SeqCst) >= self.healthy_saves {
            return Err(CheckpointError::Storage("disk full".to_string()));
        }
        self.inner.save(checkpoint).await
    }

    async fn load(&self, run_id: &str) -> checkpoint::Result<Option<Checkpoint>> {
        self.inner.load(run_id).await
    }

    async fn list(&self) -> checkpoint::Result<Vec<CheckpointSummary>> {
        self.inner.list().await
    }

    async fn delete(&self, run_id: &str) -> checkpoint::Result<bool> {
        self.inner.delete(run_id).await
    }
}

/// Summarizer that leaves `dropped` out of every digest it reports
pub struct LossySummarizer {
    pub dropped: u32,
    inner: ExtractiveSummarizer,
}

impl LossySummarizer {
    pub fn dropping(dropped: u32) -> Self {
        Self {
            dropped,
            inner: ExtractiveSummarizer::default(),
        }
    }
}

impl ContextSummarizer for LossySummarizer {
    fn digest(&self, completed: &[&ChapterRecord]) -> ContextDigest {
        let mut digest = self.inner.digest(completed);
        digest.covered.retain(|n| *n != self.dropped);
        digest
    }
}

/// Client with a generous rate limit and fast retries
pub fn client(backend: Arc<ScriptedBackend>) -> RetryingClient {
    let policy = RetryPolicy::new(3).with_initial_interval(0.5).with_max_interval(2.0);
    RetryingClient::new(backend, RateLimiter::per_minute(1000), policy)
}

pub fn settings(concurrency: usize, frontier: FrontierPolicy) -> PipelineSettings {
    PipelineSettings {
        scheduler: SchedulerConfig {
            concurrency,
            stagger: Duration::from_millis(10),
            frontier,
        },
        output_dir: PathBuf::from("books"),
        ..PipelineSettings::default()
    }
}

pub fn orchestrator(
    backend: Arc<ScriptedBackend>,
    store: Arc<dyn CheckpointStore>,
    assembler: Arc<RecordingAssembler>,
    settings: PipelineSettings,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(client(backend), store, assembler).with_settings(settings)
}

/// A run with concept and outline in place and pending chapter records
pub fn outlined_run(chapters: u32) -> BookRun {
    let mut run = BookRun::new("A lighthouse keeper inherits a map of a coast that keeps moving");
    run.concept = Some(parse_concept(&concept_json(chapters)).unwrap());
    run.outline = Some(parse_outline(&outline_json(chapters)).unwrap());
    run.seed_chapters().unwrap();
    run.state = booksmith::RunState::OutlineDone;
    run
}

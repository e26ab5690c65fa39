//! Run data model
//!
//! A [`BookRun`] owns everything produced for one book: the concept, the outline and
//! one [`ChapterRecord`] per outline entry. The whole struct is the checkpoint
//! snapshot, so every field here round-trips through serde.
//!
//! Status changes go through checked methods. An illegal transition is reported as a
//! [`PipelineError::Consistency`] and leaves the record untouched.

use crate::error::{ErrorKind, PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    ConceptDone,
    OutlineDone,
    ChaptersDone,
    RefinementDone,
    AssemblyDone,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::ConceptDone => "concept_done",
            RunState::OutlineDone => "outline_done",
            RunState::ChaptersDone => "chapters_done",
            RunState::RefinementDone => "refinement_done",
            RunState::AssemblyDone => "assembly_done",
            RunState::Failed => "failed",
        }
    }

    /// Whether the run can make no further progress without a resume
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::AssemblyDone | RunState::Failed)
    }

    /// Position along the happy path; `Failed` has none
    fn rank(&self) -> Option<u8> {
        match self {
            RunState::Created => Some(0),
            RunState::ConceptDone => Some(1),
            RunState::OutlineDone => Some(2),
            RunState::ChaptersDone => Some(3),
            RunState::RefinementDone => Some(4),
            RunState::AssemblyDone => Some(5),
            RunState::Failed => None,
        }
    }

    /// Whether this state lies at or beyond `other` on the happy path
    pub fn reached(&self, other: RunState) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// Stage that runs from this state, if any
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            RunState::Created => Some(Stage::Concept),
            RunState::ConceptDone => Some(Stage::Outline),
            RunState::OutlineDone => Some(Stage::Chapters),
            RunState::ChaptersDone => Some(Stage::Refinement),
            RunState::RefinementDone => Some(Stage::Assembly),
            RunState::AssemblyDone | RunState::Failed => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phase of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Concept,
    Outline,
    Chapters,
    Refinement,
    Assembly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Concept => "concept",
            Stage::Outline => "outline",
            Stage::Chapters => "chapters",
            Stage::Refinement => "refinement",
            Stage::Assembly => "assembly",
        }
    }

    /// State the run enters once this stage completes
    pub fn completes_to(&self) -> RunState {
        match self {
            Stage::Concept => RunState::ConceptDone,
            Stage::Outline => RunState::OutlineDone,
            Stage::Chapters => RunState::ChaptersDone,
            Stage::Refinement => RunState::RefinementDone,
            Stage::Assembly => RunState::AssemblyDone,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Audience {
    pub primary: String,
    #[serde(default)]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub key_interests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub primary: String,
    #[serde(default)]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub tone: String,
}

/// Three-act sketch proposed with the concept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSketch {
    #[serde(default)]
    pub prologue: Option<String>,
    #[serde(default)]
    pub act_one: Vec<String>,
    #[serde(default)]
    pub act_two: Vec<String>,
    #[serde(default)]
    pub act_three: Vec<String>,
    #[serde(default)]
    pub epilogue: Option<String>,
}

/// The book concept, produced once from the idea
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub title: String,
    pub subtitle: String,
    pub audience: Audience,
    pub themes: Vec<String>,
    pub genre: Genre,
    pub target_chapters: u32,
    #[serde(default)]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub structure: StructureSketch,
    #[serde(default)]
    pub unique_selling_proposition: String,
}

/// One planned chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub number: u32,
    pub title: String,
    pub plot_points: Vec<String>,
    pub target_words: u32,
}

/// Ordered chapter plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub entries: Vec<OutlineEntry>,
}

impl Outline {
    pub fn new(entries: Vec<OutlineEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, number: u32) -> Option<&OutlineEntry> {
        self.entries.iter().find(|e| e.number == number)
    }

    /// Check the outline is non-empty and numbered 1, 2, 3... in order
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.entries.is_empty() {
            return Err("outline has no chapters".to_string());
        }
        for (index, entry) in self.entries.iter().enumerate() {
            let expected = index as u32 + 1;
            if entry.number != expected {
                return Err(format!(
                    "chapter numbering must be dense and 1-based: position {} holds chapter {}",
                    expected, entry.number
                ));
            }
            if entry.title.trim().is_empty() {
                return Err(format!("chapter {} has no title", entry.number));
            }
        }
        Ok(())
    }
}

/// Generation status of one chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    Generated,
    Refined,
    Failed,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Pending => "pending",
            ChapterStatus::Generated => "generated",
            ChapterStatus::Refined => "refined",
            ChapterStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChapterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which call failed for a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterPhase {
    Generation,
    Refinement,
}

impl fmt::Display for ChapterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterPhase::Generation => f.write_str("generation"),
            ChapterPhase::Refinement => f.write_str("refinement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterFailure {
    pub phase: ChapterPhase,
    pub kind: ErrorKind,
    pub detail: String,
}

/// Progress of one chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub number: u32,
    pub title: String,
    pub raw_text: Option<String>,
    pub refined_text: Option<String>,
    pub status: ChapterStatus,
    #[serde(default)]
    pub failure: Option<ChapterFailure>,

    /// Times the record was reopened after a failure
    #[serde(default)]
    pub attempts: u32,
}

impl ChapterRecord {
    pub fn pending(number: u32, title: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            raw_text: None,
            refined_text: None,
            status: ChapterStatus::Pending,
            failure: None,
            attempts: 0,
        }
    }

    /// Generated or Refined
    pub fn is_complete(&self) -> bool {
        matches!(self.status, ChapterStatus::Generated | ChapterStatus::Refined)
    }

    /// Refined text if present, else raw text
    pub fn best_text(&self) -> Option<&str> {
        self.refined_text.as_deref().or(self.raw_text.as_deref())
    }

    fn illegal(&self, action: &str) -> PipelineError {
        PipelineError::consistency(format!(
            "chapter {} cannot be {} while {}",
            self.number, action, self.status
        ))
    }

    /// Pending -> Generated
    pub fn mark_generated(&mut self, text: impl Into<String>) -> Result<()> {
        if self.status != ChapterStatus::Pending {
            return Err(self.illegal("generated"));
        }
        self.raw_text = Some(text.into());
        self.status = ChapterStatus::Generated;
        Ok(())
    }

    /// Generated -> Refined
    pub fn mark_refined(&mut self, text: impl Into<String>) -> Result<()> {
        if self.status != ChapterStatus::Generated || self.raw_text.is_none() {
            return Err(self.illegal("refined"));
        }
        self.refined_text = Some(text.into());
        self.status = ChapterStatus::Refined;
        Ok(())
    }

    /// Pending or Generated -> Failed; raw text is kept
    pub fn mark_failed(&mut self, phase: ChapterPhase, kind: ErrorKind, detail: impl Into<String>) -> Result<()> {
        let allowed = match phase {
            ChapterPhase::Generation => self.status == ChapterStatus::Pending,
            ChapterPhase::Refinement => self.status == ChapterStatus::Generated,
        };
        if !allowed {
            return Err(self.illegal("failed"));
        }
        self.status = ChapterStatus::Failed;
        self.failure = Some(ChapterFailure {
            phase,
            kind,
            detail: detail.into(),
        });
        Ok(())
    }

    /// Undo a failure so the failed call can be attempted again
    ///
    /// Generation failures return to Pending, refinement failures to Generated.
    /// Returns whether the record changed.
    pub fn reopen(&mut self) -> bool {
        if self.status != ChapterStatus::Failed {
            return false;
        }
        let phase = self
            .failure
            .take()
            .map(|f| f.phase)
            .unwrap_or(ChapterPhase::Generation);

        self.status = match phase {
            ChapterPhase::Refinement if self.raw_text.is_some() => ChapterStatus::Generated,
            _ => {
                self.raw_text = None;
                ChapterStatus::Pending
            }
        };
        self.refined_text = None;
        self.attempts += 1;
        true
    }
}

/// Failure recorded on a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    /// State the run held when the stage failed
    pub at_state: RunState,
    pub stage: Stage,
    pub unit: Option<String>,
    pub kind: ErrorKind,
    pub detail: String,
}

/// One book generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRun {
    pub run_id: String,
    pub idea: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub concept: Option<Concept>,
    pub outline: Option<Outline>,
    pub chapters: Vec<ChapterRecord>,
    pub failure: Option<RunFailure>,

    /// Written e-book, once assembled
    pub artifact: Option<PathBuf>,

    /// Number of checkpoints saved for this run
    pub sequence: u64,
}

impl BookRun {
    pub fn new(idea: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            idea: idea.into(),
            state: RunState::Created,
            created_at: now,
            updated_at: now,
            concept: None,
            outline: None,
            chapters: Vec::new(),
            failure: None,
            artifact: None,
            sequence: 0,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn chapter(&self, number: u32) -> Option<&ChapterRecord> {
        self.chapters.iter().find(|c| c.number == number)
    }

    pub fn chapter_mut(&mut self, number: u32) -> Option<&mut ChapterRecord> {
        self.chapters.iter_mut().find(|c| c.number == number)
    }

    /// Chapters with status Generated or Refined, in order
    pub fn completed_chapters(&self) -> Vec<&ChapterRecord> {
        self.chapters.iter().filter(|c| c.is_complete()).collect()
    }

    pub fn count_with(&self, status: ChapterStatus) -> usize {
        self.chapters.iter().filter(|c| c.status == status).count()
    }

    /// Create one pending record per outline entry
    ///
    /// Existing records are kept, so calling this twice is harmless.
    pub fn seed_chapters(&mut self) -> Result<()> {
        let outline = self
            .outline
            .as_ref()
            .ok_or_else(|| PipelineError::consistency("chapters requested before the outline"))?;
        if self.chapters.is_empty() {
            self.chapters = outline
                .entries
                .iter()
                .map(|e| ChapterRecord::pending(e.number, e.title.clone()))
                .collect();
        } else if self.chapters.len() != outline.len() {
            return Err(PipelineError::consistency(format!(
                "{} chapter records for an outline of {}",
                self.chapters.len(),
                outline.len()
            )));
        }
        Ok(())
    }

    /// Move to the state `stage` completes to
    ///
    /// Only the state immediately following the current one is accepted.
    pub fn complete_stage(&mut self, stage: Stage) -> Result<()> {
        if self.state.next_stage() != Some(stage) {
            return Err(PipelineError::consistency(format!(
                "stage {} cannot complete from state {}",
                stage, self.state
            )));
        }
        self.state = stage.completes_to();
        self.touch();
        Ok(())
    }

    /// Record a failure and enter `Failed`
    pub fn fail(&mut self, stage: Stage, unit: Option<String>, kind: ErrorKind, detail: impl Into<String>) {
        let at_state = match (&self.failure, self.state) {
            (Some(previous), RunState::Failed) => previous.at_state,
            _ => self.state,
        };
        self.failure = Some(RunFailure {
            at_state,
            stage,
            unit,
            kind,
            detail: detail.into(),
        });
        self.state = RunState::Failed;
        self.touch();
    }

    /// Prepare a stored run for another drive
    ///
    /// Clears the failure and returns to the state held when it happened, reopens
    /// failed chapters, then steps back to the earliest stage that still has work:
    /// `OutlineDone` while any chapter lacks text, `ChaptersDone` while any chapter is
    /// unrefined. Returns the chapters that were reopened.
    pub fn prepare_resume(&mut self) -> Vec<u32> {
        if let Some(failure) = self.failure.take() {
            self.state = failure.at_state;
        }

        let reopened: Vec<u32> = self
            .chapters
            .iter_mut()
            .filter_map(|c| c.reopen().then_some(c.number))
            .collect();

        if self.state == RunState::AssemblyDone {
            return reopened;
        }

        let missing_text = self.chapters.iter().any(|c| c.status == ChapterStatus::Pending);
        let unrefined = self.chapters.iter().any(|c| c.status != ChapterStatus::Refined);

        if missing_text && self.state.reached(RunState::ChaptersDone) {
            self.state = RunState::OutlineDone;
        } else if unrefined && self.state.reached(RunState::RefinementDone) {
            self.state = RunState::ChaptersDone;
        }
        self.touch();
        reopened
    }
}

//! Storage backend trait for run checkpoints
//!
//! A store keeps the latest [`Checkpoint`] per run id. Saving replaces the previous
//! envelope for that run; implementations must make the replacement atomic so that a
//! crash never leaves a half-written snapshot behind.

use crate::checkpoint::{Checkpoint, CheckpointSummary};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence backend for run checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store `checkpoint` as the latest snapshot of its run
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Latest snapshot of `run_id`, or `None` if the run is unknown
    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Every stored run, most recently saved first
    async fn list(&self) -> Result<Vec<CheckpointSummary>>;

    /// Remove the run's snapshot
    ///
    /// # Returns
    ///
    /// `true` if something was removed
    async fn delete(&self, run_id: &str) -> Result<bool>;
}

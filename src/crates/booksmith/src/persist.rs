//! Run snapshots on top of a [`CheckpointStore`]

use crate::error::{PipelineError, Result};
use crate::model::BookRun;
use checkpoint::{Checkpoint, CheckpointStore, CheckpointSummary};
use std::sync::Arc;
use tracing::debug;

/// Saves and restores whole [`BookRun`] snapshots
#[derive(Clone)]
pub struct RunCheckpointer {
    store: Arc<dyn CheckpointStore>,
}

impl RunCheckpointer {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Persist `run` as its latest checkpoint
    ///
    /// Bumps the run's sequence number first, so the stored snapshot carries the
    /// sequence it was saved under.
    pub async fn save(&self, run: &mut BookRun) -> Result<()> {
        run.sequence += 1;
        run.touch();
        let checkpoint = Checkpoint::from_state(&run.run_id, run.sequence, &*run)?;
        self.store.save(&checkpoint).await?;
        debug!(
            run_id = %run.run_id,
            sequence = run.sequence,
            state = %run.state,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Latest snapshot of `run_id`, if the run is known
    pub async fn load(&self, run_id: &str) -> Result<Option<BookRun>> {
        let Some(checkpoint) = self.store.load(run_id).await? else {
            return Ok(None);
        };
        let run: BookRun = checkpoint.decode_state()?;
        if run.run_id != run_id {
            return Err(PipelineError::consistency(format!(
                "checkpoint for {} holds run {}",
                run_id, run.run_id
            )));
        }
        Ok(Some(run))
    }

    pub async fn list_runs(&self) -> Result<Vec<CheckpointSummary>> {
        Ok(self.store.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunState;
    use checkpoint::InMemoryCheckpointStore;

    #[tokio::test]
    async fn test_save_bumps_sequence_and_round_trips() {
        let checkpointer = RunCheckpointer::new(Arc::new(InMemoryCheckpointStore::new()));
        let mut run = BookRun::new("A lighthouse keeper finds a map");

        checkpointer.save(&mut run).await.unwrap();
        run.complete_stage(crate::model::Stage::Concept).unwrap();
        checkpointer.save(&mut run).await.unwrap();

        let loaded = checkpointer.load(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(loaded.sequence, 2);
        assert_eq!(loaded.state, RunState::ConceptDone);
    }

    #[tokio::test]
    async fn test_unknown_run_is_none() {
        let checkpointer = RunCheckpointer::new(Arc::new(InMemoryCheckpointStore::new()));
        assert!(checkpointer.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mismatched_run_id_is_rejected() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let run = BookRun::new("idea");
        store
            .save(&Checkpoint::from_state("other-run", 1, &run).unwrap())
            .await
            .unwrap();

        let err = RunCheckpointer::new(store).load("other-run").await.unwrap_err();
        assert!(matches!(err, PipelineError::Consistency(_)));
    }
}

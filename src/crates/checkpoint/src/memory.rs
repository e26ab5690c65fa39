//! In-memory checkpoint storage for tests and dry runs
//!
//! Envelopes are kept serialized so a load goes through the same decode path as the
//! file store.

use crate::checkpoint::{validate_run_id, Checkpoint, CheckpointSummary};
use crate::error::Result;
use crate::serializer::{JsonSerializer, SerializerProtocol};
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint store
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    serializer: JsonSerializer,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every stored run
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        validate_run_id(&checkpoint.run_id)?;
        let bytes = self.serializer.dumps(checkpoint)?;
        self.entries
            .write()
            .await
            .insert(checkpoint.run_id.clone(), bytes);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        validate_run_id(run_id)?;
        let entries = self.entries.read().await;
        match entries.get(run_id) {
            Some(bytes) => {
                let checkpoint: Checkpoint = self.serializer.loads(bytes)?;
                checkpoint.check_version()?;
                Ok(Some(checkpoint))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let entries = self.entries.read().await;
        let mut summaries = entries
            .values()
            .map(|bytes| self.serializer.loads::<Checkpoint>(bytes).map(|c| c.summary()))
            .collect::<Result<Vec<_>>>()?;
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(summaries)
    }

    async fn delete(&self, run_id: &str) -> Result<bool> {
        validate_run_id(run_id)?;
        Ok(self.entries.write().await.remove(run_id).is_some())
    }
}

//! Directory-backed checkpoint storage
//!
//! One file per run, named `<run_id>.<ext>`. Saves write a temporary file in the same
//! directory and rename it over the previous snapshot, so readers only ever observe a
//! complete envelope.

use crate::checkpoint::{validate_run_id, Checkpoint, CheckpointSummary};
use crate::error::{CheckpointError, Result};
use crate::serializer::{JsonSerializer, SerializerProtocol};
use crate::traits::CheckpointStore;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Checkpoint store writing one file per run
#[derive(Debug, Clone)]
pub struct FileCheckpointStore<S = JsonSerializer> {
    dir: PathBuf,
    serializer: S,
}

impl FileCheckpointStore<JsonSerializer> {
    /// Create a JSON store rooted at `dir`
    ///
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_serializer(dir, JsonSerializer::new())
    }
}

impl<S: SerializerProtocol> FileCheckpointStore<S> {
    pub fn with_serializer(dir: impl Into<PathBuf>, serializer: S) -> Self {
        Self {
            dir: dir.into(),
            serializer,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `run_id`
    pub fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        validate_run_id(run_id)?;
        Ok(self
            .dir
            .join(format!("{}.{}", run_id, self.serializer.extension())))
    }

    fn decode(&self, path: &Path, bytes: &[u8]) -> Result<Checkpoint> {
        let checkpoint: Checkpoint = self.serializer.loads(bytes)?;
        checkpoint.check_version()?;
        let expected = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if checkpoint.run_id != expected {
            return Err(CheckpointError::Invalid(format!(
                "{} holds run '{}'",
                path.display(),
                checkpoint.run_id
            )));
        }
        Ok(checkpoint)
    }
}

fn write_atomically(dir: PathBuf, target: PathBuf, bytes: Vec<u8>) -> Result<()> {
    std::fs::create_dir_all(&dir)?;
    let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
    staged.write_all(&bytes)?;
    staged.as_file().sync_all()?;
    staged
        .persist(&target)
        .map_err(|e| CheckpointError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl<S: SerializerProtocol + 'static> CheckpointStore for FileCheckpointStore<S> {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let target = self.path_for(&checkpoint.run_id)?;
        let bytes = self.serializer.dumps(checkpoint)?;
        let dir = self.dir.clone();

        tokio::task::spawn_blocking(move || write_atomically(dir, target, bytes))
            .await
            .map_err(|e| CheckpointError::Storage(format!("checkpoint writer panicked: {}", e)))??;

        tracing::trace!(run_id = %checkpoint.run_id, sequence = checkpoint.sequence, "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(run_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => self.decode(&path, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.serializer.extension()) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match self.decode(&path, &bytes) {
                Ok(checkpoint) => summaries.push(checkpoint.summary()),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                }
            }
        }

        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.run_id.cmp(&b.run_id)));
        Ok(summaries)
    }

    async fn delete(&self, run_id: &str) -> Result<bool> {
        let path = self.path_for(run_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

//! Checkpoint persistence for booksmith runs
//!
//! A run's progress is stored as a [`Checkpoint`] envelope keyed by run id. The store
//! keeps only the latest envelope per run; the orchestrator writes one after every
//! state-changing transition and reads it back on resume.
//!
//! # Backends
//!
//! - [`InMemoryCheckpointStore`] - process-local, for tests and dry runs
//! - [`FileCheckpointStore`] - one file per run with atomic replacement
//!
//! # Example
//!
//! ```rust,ignore
//! use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore};
//!
//! let store = FileCheckpointStore::new(".booksmith/checkpoints");
//! store.save(&Checkpoint::from_state(&run_id, 3, &snapshot)?).await?;
//!
//! if let Some(latest) = store.load(&run_id).await? {
//!     let snapshot: Snapshot = latest.decode_state()?;
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod serializer;
pub mod traits;

pub use checkpoint::{validate_run_id, Checkpoint, CheckpointSummary, FORMAT_VERSION};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use serializer::{JsonSerializer, SerializerProtocol};
pub use traits::CheckpointStore;

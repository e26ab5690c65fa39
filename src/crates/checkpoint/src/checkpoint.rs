//! The checkpoint envelope

use crate::error::{CheckpointError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope format written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// A durable snapshot of one run
///
/// `state` holds the caller's snapshot as a JSON document tree, so the store never needs
/// to know the shape of the run it persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Run the snapshot belongs to
    pub run_id: String,

    /// Envelope format version
    pub format_version: u32,

    /// Monotonic save counter for the run
    pub sequence: u64,

    /// When the snapshot was taken
    pub saved_at: DateTime<Utc>,

    /// Snapshot payload
    pub state: serde_json::Value,
}

impl Checkpoint {
    /// Create an envelope around an already-encoded state
    pub fn new(run_id: impl Into<String>, sequence: u64, state: serde_json::Value) -> Self {
        Self {
            run_id: run_id.into(),
            format_version: FORMAT_VERSION,
            sequence,
            saved_at: Utc::now(),
            state,
        }
    }

    /// Encode `state` and wrap it
    pub fn from_state<T: Serialize>(run_id: impl Into<String>, sequence: u64, state: &T) -> Result<Self> {
        Ok(Self::new(run_id, sequence, serde_json::to_value(state)?))
    }

    /// Decode the payload into `T`
    pub fn decode_state<T: DeserializeOwned>(&self) -> Result<T> {
        self.check_version()?;
        Ok(serde_json::from_value(self.state.clone())?)
    }

    /// Reject envelopes from a newer format
    pub fn check_version(&self) -> Result<()> {
        if self.format_version > FORMAT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.format_version,
                supported: FORMAT_VERSION,
            });
        }
        Ok(())
    }

    /// Summary used by listings
    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            run_id: self.run_id.clone(),
            sequence: self.sequence,
            saved_at: self.saved_at,
        }
    }
}

/// Lightweight description of a stored checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub run_id: String,
    pub sequence: u64,
    pub saved_at: DateTime<Utc>,
}

/// Check that `run_id` is safe to use as a storage key
///
/// Allowed: non-empty ASCII alphanumerics, `-` and `_`.
pub fn validate_run_id(run_id: &str) -> Result<()> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidRunId(run_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Progress {
        stage: String,
        done: Vec<u32>,
    }

    #[test]
    fn test_state_round_trip() {
        let progress = Progress {
            stage: "chapters".into(),
            done: vec![1, 2],
        };
        let checkpoint = Checkpoint::from_state("run-1", 4, &progress).unwrap();

        assert_eq!(checkpoint.format_version, FORMAT_VERSION);
        assert_eq!(checkpoint.sequence, 4);
        assert_eq!(checkpoint.decode_state::<Progress>().unwrap(), progress);
    }

    #[test]
    fn test_newer_format_is_rejected() {
        let mut checkpoint = Checkpoint::new("run-1", 1, json!({}));
        checkpoint.format_version = FORMAT_VERSION + 1;

        let err = checkpoint.decode_state::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, CheckpointError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_validate_run_id() {
        assert!(validate_run_id("4f1c2e3a-0b6d-4c6e-9a4e-1b2c3d4e5f60").is_ok());
        assert!(validate_run_id("my_book_7").is_ok());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("../etc").is_err());
        assert!(validate_run_id("a/b").is_err());
        assert!(validate_run_id("naïve").is_err());
    }
}

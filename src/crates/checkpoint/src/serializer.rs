//! Serialization protocol for stored checkpoints

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Protocol for turning checkpoint envelopes into bytes and back
pub trait SerializerProtocol: Send + Sync {
    /// Serialize a value to bytes
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes
    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T>;

    /// File extension used by file-backed stores
    fn extension(&self) -> &'static str;
}

/// JSON serializer (default)
///
/// Pretty output keeps checkpoint files readable when inspecting a stuck run.
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerProtocol for JsonSerializer {
    fn dumps<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        if self.pretty {
            Ok(serde_json::to_vec_pretty(value)?)
        } else {
            Ok(serde_json::to_vec(value)?)
        }
    }

    fn loads<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

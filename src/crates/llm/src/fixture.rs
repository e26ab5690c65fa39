//! Dry-run backend answering from stored response files.
//!
//! A request tagged `outline` is answered with the contents of `outline.json`,
//! `outline.md` or `outline.txt` in the fixture directory, whichever exists first.
//! Tags without a file fail, unless a fallback backend was attached to answer them.

use crate::backend::ChatBackend;
use crate::error::ServiceError;
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXTENSIONS: [&str; 3] = ["json", "md", "txt"];

/// Backend that reads canned responses from a directory.
#[derive(Clone)]
pub struct FixtureBackend {
    dir: PathBuf,
    fallback: Option<Arc<dyn ChatBackend>>,
}

impl fmt::Debug for FixtureBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureBackend")
            .field("dir", &self.dir)
            .field("fallback", &self.fallback.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl FixtureBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback: None,
        }
    }

    /// Send requests that have no fixture to `fallback`
    pub fn with_fallback(mut self, fallback: Arc<dyn ChatBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn find(&self, tag: &str) -> Option<PathBuf> {
        for ext in EXTENSIONS {
            let candidate = self.dir.join(format!("{}.{}", tag, ext));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl ChatBackend for FixtureBackend {
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ServiceError> {
        // Tags are internal labels; refuse anything that could escape the directory.
        if request.tag.is_empty() || request.tag.contains(['/', '\\']) || request.tag.contains("..") {
            return Err(ServiceError::permanent(format!(
                "Invalid fixture tag '{}'",
                request.tag
            )));
        }

        let Some(path) = self.find(&request.tag).await else {
            if let Some(fallback) = &self.fallback {
                tracing::debug!(tag = %request.tag, backend = fallback.name(), "No fixture, using fallback");
                return fallback.chat(request).await;
            }
            return Err(ServiceError::permanent(format!(
                "No fixture for '{}' in {}",
                request.tag,
                self.dir.display()
            )));
        };

        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ServiceError::permanent(format!("Cannot read fixture {}: {}", path.display(), e))
        })?;

        tracing::debug!(tag = %request.tag, path = %path.display(), "Answered from fixture");
        Ok(ChatResponse::text(text))
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

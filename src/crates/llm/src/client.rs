//! The rate-limited retrying client.
//!
//! Every attempt first takes a slot from the shared [`RateLimiter`], then runs under a
//! per-attempt deadline. Transient failures are retried with exponential backoff;
//! permanent ones surface at once.

use crate::backend::ChatBackend;
use crate::error::ServiceError;
use crate::text::strip_reasoning;
use crate::types::{ChatMessage, ChatRequest, ChatResponse, Role};
use std::sync::Arc;
use std::time::Duration;
use tooling::{with_retry, with_timeout, RateLimiter, RetryPolicy};

/// Appended to the system prompt of every request.
pub const NO_CITATIONS: &str = "Do not include any citations in your response.";

/// Behaviour knobs for [`RetryingClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline for one attempt.
    pub attempt_timeout: Duration,

    /// Keep `<think>` sections in generated text.
    pub keep_reasoning: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(120),
            keep_reasoning: false,
        }
    }
}

/// Wraps a [`ChatBackend`] with rate limiting, timeouts and classified retry.
///
/// Clones share the backend and the limiter.
#[derive(Clone)]
pub struct RetryingClient {
    backend: Arc<dyn ChatBackend>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    options: ClientOptions,
}

impl RetryingClient {
    pub fn new(backend: Arc<dyn ChatBackend>, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            backend,
            limiter,
            policy,
            options: ClientOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Perform one logical call.
    ///
    /// On failure the returned error carries the number of attempts made.
    pub async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ServiceError> {
        let request = with_citation_guard(request);
        let tag = request.tag.clone();

        let outcome = with_retry(&self.policy, |attempt| {
            let request = request.clone();
            async move {
                let waited = self.limiter.acquire().await;
                tracing::debug!(
                    tag = %request.tag,
                    attempt,
                    backend = self.backend.name(),
                    waited_ms = waited.as_millis() as u64,
                    "Dispatching request"
                );
                with_timeout(self.options.attempt_timeout, self.backend.chat(request))
                    .await
                    .unwrap_or_else(|timed_out| Err(ServiceError::from(timed_out)))
            }
        })
        .await;

        match outcome {
            Ok(mut response) => {
                if !self.options.keep_reasoning {
                    response.text = strip_reasoning(&response.text);
                }
                Ok(response)
            }
            Err(failure) => {
                tracing::warn!(
                    tag = %tag,
                    attempts = failure.attempts,
                    kind = %failure.error.kind,
                    "Request failed"
                );
                Err(failure.error.with_attempts(failure.attempts))
            }
        }
    }
}

/// Make the system prompt end with the no-citations instruction.
fn with_citation_guard(mut request: ChatRequest) -> ChatRequest {
    match request.messages.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => {
            if !system.content.trim_end().ends_with(NO_CITATIONS) {
                system.content = format!("{} {}", system.content.trim_end(), NO_CITATIONS);
            }
        }
        None => request.messages.insert(0, ChatMessage::system(NO_CITATIONS)),
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_guard_appends_to_system() {
        let request = ChatRequest::new(
            "concept",
            vec![ChatMessage::system("You are an editor."), ChatMessage::user("idea")],
        );
        let guarded = with_citation_guard(request);
        assert_eq!(
            guarded.messages[0].content,
            "You are an editor. Do not include any citations in your response."
        );
        assert_eq!(guarded.messages.len(), 2);
    }

    #[test]
    fn test_citation_guard_inserts_system_when_missing() {
        let guarded = with_citation_guard(ChatRequest::new("x", vec![ChatMessage::user("hi")]));
        assert_eq!(guarded.messages[0].role, Role::System);
        assert_eq!(guarded.messages[0].content, NO_CITATIONS);
    }

    #[test]
    fn test_citation_guard_is_idempotent() {
        let once = with_citation_guard(ChatRequest::new("x", vec![ChatMessage::system("Be brief.")]));
        let twice = with_citation_guard(once.clone());
        assert_eq!(once, twice);
    }
}

//! The seam between the retrying client and a concrete service.

use crate::error::ServiceError;
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;

/// One attempt at a chat completion.
///
/// Implementations perform a single call and classify any failure; rate limiting,
/// timeouts and retries are layered on by [`crate::client::RetryingClient`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce a completion for `request`.
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ServiceError>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

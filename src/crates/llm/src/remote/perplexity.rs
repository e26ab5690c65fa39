//! Perplexity client implementation.
//!
//! Speaks the OpenAI chat-completions wire shape, so it also serves other compatible
//! endpoints.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::PerplexityClient;
//! use llm::config::{RemoteLlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
//!
//! let config = RemoteLlmConfig::from_env("PERPLEXITY_API_KEY", DEFAULT_BASE_URL, DEFAULT_MODEL)?;
//! let client = PerplexityClient::new(config)?;
//! ```

use crate::backend::ChatBackend;
use crate::config::RemoteLlmConfig;
use crate::error::{Result, ServiceError};
use crate::types::{ChatMessage, ChatRequest, ChatResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Perplexity API client.
#[derive(Clone)]
pub struct PerplexityClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl PerplexityClient {
    /// Create a new client with the given configuration.
    ///
    /// Only the connection phase is bounded here; the overall per-attempt deadline is
    /// applied by the retrying client.
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemoteLlmConfig {
        &self.config
    }

    fn build_body<'a>(&'a self, request: &'a ChatRequest) -> CompletionRequest<'a> {
        CompletionRequest {
            model: request.model.as_deref().unwrap_or(&self.config.model),
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
        }
    }
}

/// Turn a successful response body into a [`ChatResponse`].
///
/// A body that does not have the chat-completion shape, has no choices, or whose
/// first choice carries no text is a permanent error.
pub(crate) fn parse_completion(body: &str) -> std::result::Result<ChatResponse, ServiceError> {
    let completion: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        ServiceError::permanent(format!("Undecodable completion response: {}", e))
    })?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::permanent("Completion response has no choices"))?;

    let text = match choice.message.content {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            return Err(ServiceError::permanent(format!(
                "Completion response has no text (finish reason: {})",
                choice.finish_reason.as_deref().unwrap_or("none")
            )))
        }
    };

    Ok(ChatResponse {
        text,
        model: completion.model,
        finish_reason: choice.finish_reason,
    })
}

#[async_trait]
impl ChatBackend for PerplexityClient {
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ServiceError> {
        let body = self.build_body(&request);

        let response = self
            .client
            .post(&self.config.base_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::transient(format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::transient(format!("Reading response failed: {}", e.without_url())))?;

        if !status.is_success() {
            tracing::debug!(tag = %request.tag, status = status.as_u16(), "Service returned an error status");
            return Err(ServiceError::from_status(status.as_u16(), &text));
        }

        parse_completion(&text)
    }

    fn name(&self) -> &str {
        "perplexity"
    }
}

// Wire types
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

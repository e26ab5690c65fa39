//! Configuration for the remote chat backend.

use crate::error::{LlmError, Result};
use std::fmt;
use std::time::Duration;

/// Default chat-completions endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "r1-1776";

/// Environment variable holding the API key by default.
pub const DEFAULT_API_KEY_ENV: &str = "PERPLEXITY_API_KEY";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Configuration for an OpenAI-compatible remote backend.
#[derive(Clone)]
pub struct RemoteLlmConfig {
    /// API key sent as a bearer token.
    pub api_key: String,

    /// Full chat-completions URL.
    pub base_url: String,

    /// Model name/identifier.
    pub model: String,

    /// Temperature used when a request does not set one.
    pub temperature: f32,

    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl RemoteLlmConfig {
    /// Create a new remote configuration.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Create configuration reading the API key from `env_var`.
    pub fn from_env(
        env_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = tooling::config::get_env(env_var)
            .map_err(|e| LlmError::ConfigError(e.to_string()))?
            .ok_or_else(|| LlmError::ApiKeyNotFound(env_var.to_string()))?;

        Ok(Self::new(api_key, base_url, model))
    }

    /// Set the default temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// The API key never reaches logs.
impl fmt::Debug for RemoteLlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLlmConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

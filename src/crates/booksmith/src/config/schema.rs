//! Configuration schema for booksmith

use super::ConfigError;
use crate::prompts::PromptSettings;
use crate::scheduler::{FrontierPolicy, SchedulerConfig};
use crate::summarizer::ExtractiveSummarizer;
use llm::{ClientOptions, LlmError, RemoteLlmConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tooling::{RateLimiter, RetryPolicy};

/// Longest retry delay a configuration may ask for, in seconds
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// Main booksmith configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BooksmithConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub assembly: AssemblyConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Full chat-completions URL
    pub base_url: String,

    pub model: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,

    /// Deadline for a single attempt, in seconds
    pub request_timeout_secs: u64,

    /// Keep `<think>` sections in generated text
    pub keep_reasoning: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: llm::config::DEFAULT_BASE_URL.to_string(),
            model: llm::config::DEFAULT_MODEL.to_string(),
            api_key_env: llm::config::DEFAULT_API_KEY_ENV.to_string(),
            temperature: llm::config::DEFAULT_TEMPERATURE,
            request_timeout_secs: 120,
            keep_reasoning: false,
        }
    }
}

/// Outbound request rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Requests allowed in any rolling window
    pub requests_per_window: usize,

    pub window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 20,
            window_secs: 60,
        }
    }
}

/// Retry schedule for transient failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first
    pub max_attempts: usize,

    pub initial_delay_secs: f64,

    pub backoff_factor: f64,

    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_secs: 1.0,
            backoff_factor: 2.0,
            max_delay_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Chapters generated at the same time
    pub concurrency: usize,

    /// Delay between two chapter dispatches, in milliseconds
    pub stagger_ms: u64,

    pub frontier: FrontierPolicy,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            concurrency: 3,
            stagger_ms: 500,
            frontier: FrontierPolicy::Strict,
        }
    }
}

/// Rolling context handed to chapter generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub recent_chapters: usize,
    pub excerpt_chars: usize,
    pub synopsis_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        let summarizer = ExtractiveSummarizer::default();
        Self {
            recent_chapters: summarizer.recent_chapters,
            excerpt_chars: summarizer.excerpt_chars,
            synopsis_chars: summarizer.synopsis_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub author: String,

    /// Directory the e-book is written to
    pub output_dir: PathBuf,

    /// Assemble chapters that were never refined from their raw text
    pub accept_unrefined: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            author: "Booksmith".to_string(),
            output_dir: PathBuf::from("books"),
            accept_unrefined: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory holding one checkpoint file per run
    pub dir: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".booksmith").join("checkpoints"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl BooksmithConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.scheduler.concurrency == 0 {
            return invalid("scheduler.concurrency must be at least 1");
        }
        if self.limits.requests_per_window == 0 {
            return invalid("limits.requests_per_window must be at least 1");
        }
        if self.limits.window_secs == 0 {
            return invalid("limits.window_secs must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !(self.retry.backoff_factor > 0.0) {
            return invalid("retry.backoff_factor must be positive");
        }
        if !self.retry.backoff_factor.is_finite() {
            return invalid("retry.backoff_factor must be finite");
        }
        let delay_ok = |secs: f64| (0.0..=MAX_RETRY_DELAY_SECS).contains(&secs);
        if !delay_ok(self.retry.initial_delay_secs) || !delay_ok(self.retry.max_delay_secs) {
            return Err(ConfigError::Invalid(format!(
                "retry delays must be between 0 and {} seconds",
                MAX_RETRY_DELAY_SECS
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return invalid("llm.temperature must be between 0 and 2");
        }
        if self.llm.request_timeout_secs == 0 {
            return invalid("llm.request_timeout_secs must be at least 1");
        }
        if self.llm.model.trim().is_empty() {
            return invalid("llm.model must not be empty");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts)
            .with_initial_interval(self.retry.initial_delay_secs)
            .with_backoff_factor(self.retry.backoff_factor)
            .with_max_interval(self.retry.max_delay_secs)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.limits.requests_per_window,
            Duration::from_secs(self.limits.window_secs),
        )
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            attempt_timeout: Duration::from_secs(self.llm.request_timeout_secs),
            keep_reasoning: self.llm.keep_reasoning,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.scheduler.concurrency,
            stagger: Duration::from_millis(self.scheduler.stagger_ms),
            frontier: self.scheduler.frontier,
        }
    }

    pub fn summarizer(&self) -> ExtractiveSummarizer {
        ExtractiveSummarizer::new(
            self.context.recent_chapters,
            self.context.excerpt_chars,
            self.context.synopsis_chars,
        )
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        PromptSettings {
            model: None,
            temperature: Some(self.llm.temperature),
        }
    }

    /// Remote backend settings, reading the API key from the configured variable
    pub fn remote_llm(&self) -> Result<RemoteLlmConfig, LlmError> {
        Ok(RemoteLlmConfig::from_env(&self.llm.api_key_env, &self.llm.base_url, &self.llm.model)?
            .with_temperature(self.llm.temperature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BooksmithConfig::default();
        config.validate().unwrap();
        assert_eq!(config.llm.model, "r1-1776");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.scheduler.concurrency, 3);
        assert_eq!(config.scheduler.frontier, FrontierPolicy::Strict);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = BooksmithConfig::default();
        config.scheduler.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = BooksmithConfig::default();
        config.limits.requests_per_window = 0;
        assert!(config.validate().is_err());

        let mut config = BooksmithConfig::default();
        config.retry.backoff_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = BooksmithConfig::default();
        config.llm.temperature = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_retry_delays() {
        for bad in [f64::INFINITY, f64::NAN, 1e300, MAX_RETRY_DELAY_SECS + 1.0, -1.0] {
            let mut config = BooksmithConfig::default();
            config.retry.max_delay_secs = bad;
            assert!(config.validate().is_err(), "max_delay_secs = {}", bad);

            let mut config = BooksmithConfig::default();
            config.retry.initial_delay_secs = bad;
            assert!(config.validate().is_err(), "initial_delay_secs = {}", bad);
        }

        let mut config = BooksmithConfig::default();
        config.retry.backoff_factor = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = BooksmithConfig::default();
        config.retry.max_delay_secs = MAX_RETRY_DELAY_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: BooksmithConfig = toml::from_str(
            r#"
[scheduler]
frontier = "wave"

[assembly]
accept_unrefined = true
"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.frontier, FrontierPolicy::Wave);
        assert_eq!(config.scheduler.concurrency, 3);
        assert!(config.assembly.accept_unrefined);
        assert_eq!(config.assembly.author, "Booksmith");
    }

    #[test]
    fn test_derived_components() {
        let mut config = BooksmithConfig::default();
        config.retry.initial_delay_secs = 0.5;
        config.scheduler.stagger_ms = 0;

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(500));
        assert_eq!(config.scheduler_config().stagger, Duration::ZERO);
        assert_eq!(config.client_options().attempt_timeout, Duration::from_secs(120));
    }
}

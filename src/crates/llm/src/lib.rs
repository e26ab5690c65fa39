//! Chat backends for booksmith.
//!
//! This crate owns the boundary to the remote text-generation service:
//!
//! - [`ChatBackend`] - one attempt at a chat completion, with failures classified as
//!   transient or permanent
//! - [`remote::PerplexityClient`] - OpenAI-compatible HTTP backend
//! - [`fixture::FixtureBackend`] - answers from stored response files (dry runs)
//! - [`client::RetryingClient`] - rate limiting, per-attempt timeout and retry on top of
//!   any backend
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::{ChatMessage, ChatRequest, RemoteLlmConfig, RetryingClient};
//! use llm::remote::PerplexityClient;
//! use std::sync::Arc;
//! use tooling::{RateLimiter, RetryPolicy};
//!
//! let config = RemoteLlmConfig::from_env(
//!     "PERPLEXITY_API_KEY",
//!     llm::config::DEFAULT_BASE_URL,
//!     llm::config::DEFAULT_MODEL,
//! )?;
//! let backend = Arc::new(PerplexityClient::new(config)?);
//! let client = RetryingClient::new(backend, RateLimiter::per_minute(20), RetryPolicy::new(3));
//!
//! let request = ChatRequest::new("concept", vec![
//!     ChatMessage::system("You are a publishing strategist."),
//!     ChatMessage::user("A lighthouse keeper finds a map."),
//! ]);
//! let response = client.invoke(request).await?;
//! println!("{}", response.text);
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod fixture;
pub mod text;
pub mod types;

#[cfg(feature = "remote")]
pub mod remote;

pub use backend::ChatBackend;
pub use client::{ClientOptions, RetryingClient};
pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result, ServiceError, ServiceErrorKind};
pub use types::{ChatMessage, ChatRequest, ChatResponse, Role};

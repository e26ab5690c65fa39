//! Remote backend implementations.
//!
//! - **Perplexity** - OpenAI-compatible chat completions (`r1-1776` by default). Any
//!   service speaking the same wire shape works by pointing `base_url` at it.

pub mod perplexity;

pub use perplexity::PerplexityClient;

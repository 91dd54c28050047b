//! Rate-limited multi-provider LLM client and trading-signal parser.
//!
//! Provides the `ProviderAdapter` trait, `DynProvider` wrapper, one adapter per
//! provider (OpenAI, Anthropic, Gemini, Groq), the shared `RateLimiter`, and
//! `LlmClient` for routing requests with 429 retry.

mod anthropic;
mod client;
mod gemini;
mod groq;
mod openai;
pub mod parser;
mod provider;
pub mod rate_limiter;

pub use anthropic::AnthropicAdapter;
pub use client::*;
pub use gemini::GeminiAdapter;
pub use groq::GroqAdapter;
pub use openai::OpenAiAdapter;
pub use parser::{parse_response, parse_signal_response, ParseOutcome, ParsedSignal};
pub use provider::{DynProvider, ProviderAdapter};
pub use rate_limiter::{parse_server_hint, RateLimitConfig, RateLimiter};

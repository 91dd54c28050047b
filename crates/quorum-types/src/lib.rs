//! Shared types and errors for the Quorum consensus engine.
//!
//! This crate provides the foundational types used across all other Quorum crates:
//! - `QuorumError` — unified error taxonomy
//! - `ProviderId` — the closed set of LLM providers
//! - `SignalResult` / `ConsensusResult` — per-provider votes and their aggregate
//! - `CallRequest` / `Prompt` — what gets sent to a provider

pub mod duration_serde;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unified error type for all Quorum subsystems.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    // === Provider Errors ===
    #[error("Provider {provider} is not configured: {message}")]
    Configuration { provider: ProviderId, message: String },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: ProviderId, body: String },

    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    // === Request Errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl QuorumError {
    /// Returns `true` if the error is transient and the call may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuorumError::RateLimited { .. })
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuorumError::Configuration { .. }
                | QuorumError::ProviderError { .. }
                | QuorumError::InvalidRequest(_)
        )
    }

    /// The provider this error is attributed to, if any.
    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            QuorumError::Configuration { provider, .. }
            | QuorumError::RateLimited { provider, .. }
            | QuorumError::ProviderError { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Maps the error to an HTTP status code for a response layer.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            QuorumError::RateLimited { .. } => Some(429),
            QuorumError::Configuration { .. } => Some(503),
            QuorumError::ProviderError { status, .. } if *status > 0 => Some(*status),
            QuorumError::ProviderError { .. } => Some(502),
            QuorumError::InvalidRequest(_) => Some(400),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, QuorumError>`.
pub type Result<T> = std::result::Result<T, QuorumError>;

// ---------------------------------------------------------------------------
// ProviderId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Gemini,
    Groq,
}

impl ProviderId {
    /// Every provider, in canonical order.
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
            ProviderId::Groq => "groq",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OpenAI",
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Gemini => "Gemini",
            ProviderId::Groq => "Groq",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OpenAI chat completions with JSON mode",
            ProviderId::Anthropic => "Anthropic Messages API",
            ProviderId::Gemini => "Google Gemini generateContent with JSON response type",
            ProviderId::Groq => "Groq OpenAI-compatible chat completions",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::Gemini => "GOOGLE_API_KEY",
            ProviderId::Groq => "GROQ_API_KEY",
        }
    }

    /// Environment variable that overrides this provider's default model.
    pub fn model_env(&self) -> String {
        format!("QUORUM_{}_MODEL", self.as_str().to_uppercase())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = QuorumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(ProviderId::OpenAi),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            "gemini" | "google" => Ok(ProviderId::Gemini),
            "groq" => Ok(ProviderId::Groq),
            other => Err(QuorumError::InvalidRequest(format!(
                "unknown provider '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Bullish => "BULLISH",
            Signal::Bearish => "BEARISH",
            Signal::Neutral => "NEUTRAL",
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Signal::Neutral)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SignalResult
// ---------------------------------------------------------------------------

/// How a `SignalResult` was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    /// The model answer parsed as a JSON object.
    Structured,
    /// Keyword salvage of an answer that was not valid JSON.
    Fallback,
    /// Synthesized for a provider whose call failed.
    Placeholder,
}

/// Maximum length (in chars) of a single provider's reasoning.
pub const MAX_REASONING_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    pub signal: Signal,
    pub confidence: u8,
    pub reasoning: String,
    pub provider: ProviderId,
    pub source: ParseSource,
}

impl SignalResult {
    /// Neutral, zero-confidence entry standing in for a failed provider call.
    pub fn placeholder(provider: ProviderId, error: &QuorumError) -> Self {
        Self {
            signal: Signal::Neutral,
            confidence: 0,
            reasoning: truncate_chars(&format!("Error: {error}"), MAX_REASONING_CHARS),
            provider,
            source: ParseSource::Placeholder,
        }
    }
}

// ---------------------------------------------------------------------------
// ConsensusResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBreakdown {
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

impl VoteBreakdown {
    pub fn total(&self) -> usize {
        self.bullish + self.bearish + self.neutral
    }

    pub fn max(&self) -> usize {
        self.bullish.max(self.bearish).max(self.neutral)
    }

    pub fn record(&mut self, signal: Signal) {
        match signal {
            Signal::Bullish => self.bullish += 1,
            Signal::Bearish => self.bearish += 1,
            Signal::Neutral => self.neutral += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_signal: Signal,
    pub consensus_confidence: u8,
    pub consensus_reasoning: String,
    pub individual_results: Vec<SignalResult>,
    pub vote_breakdown: VoteBreakdown,
}

impl ConsensusResult {
    /// `false` when no provider produced a result, meaning "no signal
    /// available" rather than a genuine neutral conclusion.
    pub fn has_signal(&self) -> bool {
        !self.individual_results.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Prompt / CallRequest
// ---------------------------------------------------------------------------

/// The system/user prompt pair produced by a prompt builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub provider: ProviderId,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CallRequest {
    pub fn new(
        provider: ProviderId,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn from_prompt(provider: ProviderId, prompt: &Prompt) -> Self {
        Self::new(provider, prompt.system.clone(), prompt.user.clone())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Truncate `s` to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = QuorumError::ProviderError {
            provider: ProviderId::OpenAi,
            status: 500,
            message: "internal server error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_configuration() {
        let err = QuorumError::Configuration {
            provider: ProviderId::Groq,
            message: "GROQ_API_KEY is not set".into(),
        };
        assert_eq!(
            err.to_string(),
            "Provider groq is not configured: GROQ_API_KEY is not set"
        );
    }

    #[test]
    fn retryable_and_terminal_are_disjoint() {
        let rate_limited = QuorumError::RateLimited {
            provider: ProviderId::Anthropic,
            body: "slow down".into(),
        };
        assert!(rate_limited.is_retryable());
        assert!(!rate_limited.is_terminal());

        let config = QuorumError::Configuration {
            provider: ProviderId::Anthropic,
            message: "missing key".into(),
        };
        assert!(!config.is_retryable());
        assert!(config.is_terminal());
        assert_eq!(config.provider(), Some(ProviderId::Anthropic));
    }

    #[test]
    fn http_status_mapping() {
        let transport = QuorumError::ProviderError {
            provider: ProviderId::Gemini,
            status: 0,
            message: "connection reset".into(),
        };
        assert_eq!(transport.http_status(), Some(502));
        assert_eq!(
            QuorumError::InvalidRequest("no providers".into()).http_status(),
            Some(400)
        );
        assert_eq!(QuorumError::Other("x".into()).http_status(), None);
    }

    #[test]
    fn provider_id_round_trips_through_str() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert_eq!("Claude".parse::<ProviderId>().unwrap(), ProviderId::Anthropic);
        assert!("mistral".parse::<ProviderId>().is_err());
    }

    #[test]
    fn provider_id_serde_uses_wire_names() {
        let json = serde_json::to_string(&ProviderId::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let json = serde_json::to_string(&ProviderId::Groq).unwrap();
        assert_eq!(json, "\"groq\"");
        assert_eq!(ProviderId::Gemini.model_env(), "QUORUM_GEMINI_MODEL");
    }

    #[test]
    fn signal_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Signal::Bullish).unwrap(), "\"BULLISH\"");
        let s: Signal = serde_json::from_str("\"BEARISH\"").unwrap();
        assert_eq!(s, Signal::Bearish);
        assert!(!Signal::Neutral.is_directional());
    }

    #[test]
    fn vote_breakdown_counts() {
        let mut votes = VoteBreakdown::default();
        for s in [Signal::Bullish, Signal::Bullish, Signal::Neutral] {
            votes.record(s);
        }
        assert_eq!(votes.total(), 3);
        assert_eq!(votes.max(), 2);
    }

    #[test]
    fn placeholder_is_neutral_zero() {
        let err = QuorumError::ProviderError {
            provider: ProviderId::Groq,
            status: 503,
            message: "unavailable".into(),
        };
        let r = SignalResult::placeholder(ProviderId::Groq, &err);
        assert_eq!(r.signal, Signal::Neutral);
        assert_eq!(r.confidence, 0);
        assert_eq!(r.source, ParseSource::Placeholder);
        assert!(r.reasoning.starts_with("Error: Provider groq returned HTTP 503"));
    }

    #[test]
    fn call_request_defaults() {
        let req = CallRequest::new(ProviderId::OpenAi, "sys", "user");
        assert!((req.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(req.max_tokens, 500);

        let req = req.with_temperature(0.7).with_max_tokens(800);
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.max_tokens, 800);
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}

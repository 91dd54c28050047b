//! Fans one prompt out to several providers and collects their signals.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use quorum_llm::LlmClient;
use quorum_types::{
    CallRequest, ConsensusResult, Prompt, ProviderId, QuorumError, Result, SignalResult,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::aggregate;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One provider at a time, spaced by `inter_provider_delay`.
    #[default]
    Sequential,
    /// All providers at once.
    Parallel,
}

/// What to do with a provider whose call failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Leave it out of the consensus.
    #[default]
    Drop,
    /// Count it as a zero-confidence NEUTRAL vote.
    Placeholder,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        })
    }
}

impl FromStr for ExecutionMode {
    type Err = QuorumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutionMode::Sequential),
            "parallel" | "par" => Ok(ExecutionMode::Parallel),
            other => Err(QuorumError::InvalidRequest(format!(
                "unknown execution mode '{other}' (expected sequential or parallel)"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::Drop => "drop",
            FailurePolicy::Placeholder => "placeholder",
        })
    }
}

impl FromStr for FailurePolicy {
    type Err = QuorumError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(FailurePolicy::Drop),
            "placeholder" => Ok(FailurePolicy::Placeholder),
            other => Err(QuorumError::InvalidRequest(format!(
                "unknown failure policy '{other}' (expected drop or placeholder)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub mode: ExecutionMode,
    /// Pause between consecutive calls in sequential mode. Nothing is waited
    /// after the last call.
    #[serde(with = "quorum_types::duration_serde")]
    pub inter_provider_delay: Duration,
    pub failure_policy: FailurePolicy,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            inter_provider_delay: Duration::from_millis(2000),
            failure_policy: FailurePolicy::Drop,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    client: Arc<LlmClient>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(client: Arc<LlmClient>, config: OrchestratorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<LlmClient> {
        &self.client
    }

    /// Ask every provider for a signal.
    ///
    /// Individual provider failures never fail the run; they are dropped or
    /// replaced by a placeholder per the configured policy. Only an empty or
    /// duplicated provider list is an error.
    pub async fn run(&self, providers: &[ProviderId], prompt: &Prompt) -> Result<Vec<SignalResult>> {
        validate_providers(providers)?;

        let outcomes = match self.config.mode {
            ExecutionMode::Sequential => self.run_sequential(providers, prompt).await,
            ExecutionMode::Parallel => self.run_parallel(providers, prompt).await,
        };

        let results: Vec<SignalResult> = providers
            .iter()
            .zip(outcomes)
            .filter_map(|(&provider, outcome)| self.settle(provider, outcome))
            .collect();

        tracing::debug!(
            requested = providers.len(),
            collected = results.len(),
            mode = %self.config.mode,
            "Provider calls finished"
        );
        Ok(results)
    }

    /// `run` followed by aggregation.
    pub async fn consensus(&self, providers: &[ProviderId], prompt: &Prompt) -> Result<ConsensusResult> {
        let results = self.run(providers, prompt).await?;
        Ok(aggregate(results))
    }

    async fn run_sequential(
        &self,
        providers: &[ProviderId],
        prompt: &Prompt,
    ) -> Vec<Result<SignalResult>> {
        let mut outcomes = Vec::with_capacity(providers.len());
        for (i, &provider) in providers.iter().enumerate() {
            if i > 0 && !self.config.inter_provider_delay.is_zero() {
                tracing::debug!(
                    provider = %provider,
                    delay_ms = self.config.inter_provider_delay.as_millis() as u64,
                    "Waiting before next provider"
                );
                tokio::time::sleep(self.config.inter_provider_delay).await;
            }
            outcomes.push(self.call_one(provider, prompt).await);
        }
        outcomes
    }

    async fn run_parallel(
        &self,
        providers: &[ProviderId],
        prompt: &Prompt,
    ) -> Vec<Result<SignalResult>> {
        let calls = providers.iter().map(|&provider| self.call_one(provider, prompt));
        futures::future::join_all(calls).await
    }

    async fn call_one(&self, provider: ProviderId, prompt: &Prompt) -> Result<SignalResult> {
        let request = CallRequest::from_prompt(provider, prompt)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);
        self.client.analyze(&request).await
    }

    fn settle(&self, provider: ProviderId, outcome: Result<SignalResult>) -> Option<SignalResult> {
        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    provider = %provider,
                    error = %e,
                    policy = %self.config.failure_policy,
                    "Provider failed"
                );
                match self.config.failure_policy {
                    FailurePolicy::Drop => None,
                    FailurePolicy::Placeholder => Some(SignalResult::placeholder(provider, &e)),
                }
            }
        }
    }
}

fn validate_providers(providers: &[ProviderId]) -> Result<()> {
    if providers.is_empty() {
        return Err(QuorumError::InvalidRequest(
            "at least one provider is required".into(),
        ));
    }
    let mut seen = HashSet::new();
    for p in providers {
        if !seen.insert(p) {
            return Err(QuorumError::InvalidRequest(format!(
                "provider '{p}' listed more than once"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

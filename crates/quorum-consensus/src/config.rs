//! File-backed engine configuration.

use std::path::Path;
use std::sync::Arc;

use quorum_llm::{LlmClient, RateLimitConfig, RateLimiter, RetryConfig};
use quorum_types::Result;
use serde::{Deserialize, Serialize};

use crate::orchestrator::{Orchestrator, OrchestratorConfig};

/// Every tunable of the engine. Missing sections and fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub orchestrator: OrchestratorConfig,
}

impl QuorumConfig {
    /// Read a config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Serialize this config to JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Client with every provider whose credentials are in the environment.
    pub fn client_from_env(&self) -> LlmClient {
        let limiter = Arc::new(RateLimiter::new(self.rate_limit.clone()));
        LlmClient::from_env(limiter, self.retry.clone())
    }

    pub fn build_orchestrator(&self, client: Arc<LlmClient>) -> Orchestrator {
        Orchestrator::new(client, self.orchestrator.clone())
    }
}

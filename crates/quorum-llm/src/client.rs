use std::collections::HashMap;
use std::sync::Arc;

use quorum_types::{CallRequest, ProviderId, QuorumError, Result, SignalResult};
use serde::{Deserialize, Serialize};

use crate::parser::parse_signal_response;
use crate::rate_limiter::{parse_server_hint, RateLimiter};
use crate::{DynProvider, ProviderAdapter};

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after a 429 before the call fails for good.
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// Routes calls to registered providers, sharing one rate limiter and one
/// retry policy across all of them.
pub struct LlmClient {
    providers: HashMap<ProviderId, DynProvider>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl LlmClient {
    pub fn new(rate_limiter: Arc<RateLimiter>, retry: RetryConfig) -> Self {
        Self {
            providers: HashMap::new(),
            rate_limiter,
            retry,
        }
    }

    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        self.providers.insert(provider.id(), DynProvider::new(provider));
    }

    pub fn with_provider(mut self, provider: impl ProviderAdapter + 'static) -> Self {
        self.register_provider(provider);
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn is_configured(&self, provider: ProviderId) -> bool {
        self.providers.contains_key(&provider)
    }

    /// Registered providers in canonical order.
    pub fn configured_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.providers.contains_key(id))
            .collect()
    }

    /// Model name used for `provider`, if registered.
    pub fn model_for(&self, provider: ProviderId) -> Option<&str> {
        self.providers.get(&provider).map(|p| p.model())
    }

    /// Register every provider whose API key is present in the environment.
    pub fn from_env(rate_limiter: Arc<RateLimiter>, retry: RetryConfig) -> Self {
        let mut client = Self::new(rate_limiter, retry);
        client.register_if_configured(crate::OpenAiAdapter::from_env());
        client.register_if_configured(crate::AnthropicAdapter::from_env());
        client.register_if_configured(crate::GeminiAdapter::from_env());
        client.register_if_configured(crate::GroqAdapter::from_env());
        client
    }

    fn register_if_configured(&mut self, adapter: Result<impl ProviderAdapter + 'static>) {
        match adapter {
            Ok(adapter) => {
                tracing::debug!(provider = %adapter.id(), model = adapter.model(), "Provider registered");
                self.register_provider(adapter);
            }
            Err(e) => tracing::debug!(error = %e, "Provider skipped"),
        }
    }

    fn resolve_provider(&self, provider: ProviderId) -> Result<&DynProvider> {
        self.providers
            .get(&provider)
            .ok_or_else(|| QuorumError::Configuration {
                provider,
                message: format!("{} is not set", provider.api_key_env()),
            })
    }

    /// Send `request` and return the raw assistant text.
    ///
    /// Every attempt is spaced by the rate limiter. A 429 is retried up to
    /// `max_retries` times, sleeping for the server's hint when the body has
    /// one and the exponential backoff otherwise. Any other error, including
    /// a missing provider, is returned without retrying.
    pub async fn call(&self, request: &CallRequest) -> Result<String> {
        let provider = self.resolve_provider(request.provider)?;
        let mut retry_count = 0u32;

        loop {
            self.rate_limiter.wait_before_call(request.provider).await;

            match provider.send(request).await {
                Ok(text) => {
                    tracing::debug!(
                        provider = %request.provider,
                        attempt = retry_count + 1,
                        chars = text.len(),
                        "LLM response"
                    );
                    return Ok(text);
                }
                Err(e) if e.is_retryable() => {
                    let id = e.provider().unwrap_or(request.provider);
                    let body = match &e {
                        QuorumError::RateLimited { body, .. } => body.as_str(),
                        _ => "",
                    };

                    if retry_count >= self.retry.max_retries {
                        tracing::warn!(
                            provider = %id,
                            attempts = retry_count + 1,
                            "Rate limit retries exhausted"
                        );
                        return Err(QuorumError::ProviderError {
                            provider: id,
                            status: 429,
                            message: format!(
                                "rate limited after {} attempts: {}",
                                retry_count + 1,
                                body
                            ),
                        });
                    }

                    let hint = parse_server_hint(body);
                    let delay = hint.unwrap_or_else(|| self.rate_limiter.compute_backoff(retry_count));
                    tracing::warn!(
                        provider = %id,
                        attempt = retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        server_hint = hint.is_some(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %request.provider,
                        status = ?e.http_status(),
                        terminal = e.is_terminal(),
                        error = %e,
                        "LLM call failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Call a single provider and parse its answer into a `SignalResult`.
    pub async fn analyze(&self, request: &CallRequest) -> Result<SignalResult> {
        let text = self.call(request).await?;
        Ok(parse_signal_response(&text, request.provider))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

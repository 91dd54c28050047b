use async_trait::async_trait;
use quorum_types::{CallRequest, ProviderId, QuorumError, Result};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// One LLM provider's transport: turns a `CallRequest` into raw assistant text.
///
/// Adapters perform exactly one HTTP attempt per `send`. Retries and spacing
/// live in [`LlmClient`](crate::LlmClient).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn send(&self, request: &CallRequest) -> Result<String>;
    fn id(&self) -> ProviderId;
    fn model(&self) -> &str;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn send(&self, request: &CallRequest) -> Result<String> {
        self.0.send(request).await
    }

    pub fn id(&self) -> ProviderId {
        self.0.id()
    }

    pub fn model(&self) -> &str {
        self.0.model()
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

/// Send a JSON POST and decode the JSON response body, mapping failures
/// uniformly across providers.
pub(crate) async fn post_json(
    provider: ProviderId,
    builder: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let resp = builder
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = resp.status();
    let response_body = resp.text().await.map_err(|e| transport_error(provider, e))?;

    if !status.is_success() {
        return Err(map_error(provider, status, response_body));
    }

    serde_json::from_str(&response_body).map_err(|e| QuorumError::ProviderError {
        provider,
        status: status.as_u16(),
        message: format!("Failed to parse response JSON: {e}"),
    })
}

/// 429 is transient and carries the body for hint parsing; every other
/// non-success status is terminal.
pub(crate) fn map_error(provider: ProviderId, status: reqwest::StatusCode, body: String) -> QuorumError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        QuorumError::RateLimited { provider, body }
    } else {
        QuorumError::ProviderError {
            provider,
            status: status.as_u16(),
            message: extract_error_message(body),
        }
    }
}

/// `error.message` from a JSON error envelope, else the raw body.
fn extract_error_message(body: String) -> String {
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or(body)
}

/// The request URL is stripped: it may carry credentials in its query.
fn transport_error(provider: ProviderId, e: reqwest::Error) -> QuorumError {
    QuorumError::ProviderError {
        provider,
        status: 0,
        message: e.without_url().to_string(),
    }
}

pub(crate) fn missing_text(provider: ProviderId) -> QuorumError {
    QuorumError::ProviderError {
        provider,
        status: 200,
        message: "response contained no assistant text".into(),
    }
}

/// Read `name` from the environment, treating an empty value as absent.
pub(crate) fn env_key(provider: ProviderId, names: &[&str]) -> Result<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| QuorumError::Configuration {
            provider,
            message: format!("{} is not set", names.join(" or ")),
        })
}

/// Model override from `QUORUM_<PROVIDER>_MODEL`, else `default`.
pub(crate) fn env_model(provider: ProviderId, default: &str) -> String {
    std::env::var(provider.model_env())
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use async_trait::async_trait;
use serde_json::json;

use crate::provider::{env_key, env_model, missing_text, post_json};
use crate::ProviderAdapter;
use quorum_types::{CallRequest, ProviderId, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// AnthropicAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicAdapter {
    pub const DEFAULT_MODEL: &'static str = "claude-haiku-4-5-20251001";

    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn from_env() -> Result<Self> {
        let provider = ProviderId::Anthropic;
        let key = env_key(provider, &[provider.api_key_env()])?;
        Ok(Self::new(key).with_model(env_model(provider, Self::DEFAULT_MODEL)))
    }
}

// ---------------------------------------------------------------------------
// Request / response translation
// ---------------------------------------------------------------------------

/// System prompt is a top-level field; the user prompt is the only message.
fn build_request_body(model: &str, request: &CallRequest) -> serde_json::Value {
    json!({
        "model": model,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "system": request.system_prompt,
        "messages": [
            { "role": "user", "content": request.user_prompt },
        ],
    })
}

/// Concatenate every `text` block of `content`.
fn extract_text(body: &serde_json::Value) -> Option<String> {
    let text: String = body["content"]
        .as_array()?
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    async fn send(&self, request: &CallRequest) -> Result<String> {
        let body = build_request_body(&self.model, request);
        let builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);

        let json = post_json(ProviderId::Anthropic, builder, &body).await?;
        extract_text(&json).ok_or_else(|| missing_text(ProviderId::Anthropic))
    }

    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_types::QuorumError;

    #[test]
    fn from_env_with_key_returns_ok_and_without_key_returns_err() {
        std::env::set_var("ANTHROPIC_API_KEY", "sk-ant-test");
        let adapter = AnthropicAdapter::from_env().unwrap();
        assert_eq!(adapter.id(), ProviderId::Anthropic);

        std::env::remove_var("ANTHROPIC_API_KEY");
        assert!(matches!(
            AnthropicAdapter::from_env().unwrap_err(),
            QuorumError::Configuration { provider: ProviderId::Anthropic, .. }
        ));
    }

    #[test]
    fn system_prompt_is_top_level() {
        let req = CallRequest::new(ProviderId::Anthropic, "Be terse.", "Analyze MSFT.")
            .with_temperature(0.5);
        let body = build_request_body("claude-haiku-4-5-20251001", &req);

        assert_eq!(body["model"], "claude-haiku-4-5-20251001");
        assert_eq!(body["system"], "Be terse.");
        assert_eq!(body["max_tokens"], 500);
        assert!((body["temperature"].as_f64().unwrap() - 0.5).abs() < 0.01);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Analyze MSFT.");
    }

    #[test]
    fn extract_text_joins_text_blocks() {
        let body = json!({
            "id": "msg_01",
            "type": "message",
            "content": [
                { "type": "text", "text": "{\"signal\": " },
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "\"NEUTRAL\"}" }
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(
            extract_text(&body).as_deref(),
            Some("{\"signal\": \"NEUTRAL\"}")
        );
    }

    #[test]
    fn extract_text_none_without_text_blocks() {
        assert!(extract_text(&json!({ "content": [] })).is_none());
        assert!(extract_text(&json!({ "error": "x" })).is_none());
    }

    #[test]
    fn with_base_url_sets_custom_url() {
        let adapter =
            AnthropicAdapter::new("key".into()).with_base_url("https://proxy.internal".into());
        assert_eq!(adapter.base_url, "https://proxy.internal");
        assert_eq!(adapter.model(), AnthropicAdapter::DEFAULT_MODEL);
    }
}

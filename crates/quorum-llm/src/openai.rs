use async_trait::async_trait;
use serde_json::json;

use crate::provider::{env_key, env_model, missing_text, post_json};
use crate::ProviderAdapter;
use quorum_types::{CallRequest, ProviderId, Result};

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiAdapter {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let provider = ProviderId::OpenAi;
        let key = env_key(provider, &[provider.api_key_env()])?;
        Ok(Self::new(key).with_model(env_model(provider, Self::DEFAULT_MODEL)))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

// ---------------------------------------------------------------------------
// Chat-completions envelope (shared with OpenAI-compatible providers)
// ---------------------------------------------------------------------------

/// System + user message array with JSON mode enabled.
pub(crate) fn build_chat_body(model: &str, request: &CallRequest) -> serde_json::Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system_prompt },
            { "role": "user", "content": request.user_prompt },
        ],
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
        "response_format": { "type": "json_object" },
    })
}

/// `choices[0].message.content`
pub(crate) fn extract_chat_text(body: &serde_json::Value) -> Option<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(String::from)
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn send(&self, request: &CallRequest) -> Result<String> {
        let body = build_chat_body(&self.model, request);
        let builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key));

        let json = post_json(ProviderId::OpenAi, builder, &body).await?;
        extract_chat_text(&json).ok_or_else(|| missing_text(ProviderId::OpenAi))
    }

    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

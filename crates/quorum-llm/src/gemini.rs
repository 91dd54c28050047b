use async_trait::async_trait;
use serde_json::json;

use crate::provider::{env_key, env_model, missing_text, post_json};
use crate::ProviderAdapter;
use quorum_types::{CallRequest, ProviderId, Result};

// ---------------------------------------------------------------------------
// GeminiAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GeminiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiAdapter {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
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
        let provider = ProviderId::Gemini;
        let key = env_key(provider, &[provider.api_key_env(), "GEMINI_API_KEY"])?;
        Ok(Self::new(key).with_model(env_model(provider, Self::DEFAULT_MODEL)))
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

// ---------------------------------------------------------------------------
// Request / response translation
// ---------------------------------------------------------------------------

/// Single-prompt format: system and user text are concatenated into one part.
fn build_request_body(request: &CallRequest) -> serde_json::Value {
    let prompt = format!("{}\n\n{}", request.system_prompt, request.user_prompt);
    json!({
        "contents": [
            { "role": "user", "parts": [ { "text": prompt } ] }
        ],
        "generationConfig": {
            "temperature": request.temperature,
            "maxOutputTokens": request.max_tokens,
            "responseMimeType": "application/json",
        },
    })
}

/// Concatenate `candidates[0].content.parts[*].text`.
fn extract_text(body: &serde_json::Value) -> Option<String> {
    let text: String = body["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn send(&self, request: &CallRequest) -> Result<String> {
        let body = build_request_body(request);
        let builder = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key);

        let json = post_json(ProviderId::Gemini, builder, &body).await?;
        extract_text(&json).ok_or_else(|| missing_text(ProviderId::Gemini))
    }

    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

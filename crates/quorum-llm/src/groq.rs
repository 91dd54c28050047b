use async_trait::async_trait;

use crate::openai::{build_chat_body, extract_chat_text};
use crate::provider::{env_key, env_model, missing_text, post_json};
use crate::ProviderAdapter;
use quorum_types::{CallRequest, ProviderId, Result};

/// Groq speaks the OpenAI chat-completions envelope under `/openai/v1`.
#[derive(Debug)]
pub struct GroqAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GroqAdapter {
    pub const DEFAULT_MODEL: &'static str = "llama-3.3-70b-versatile";

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.groq.com".to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let provider = ProviderId::Groq;
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

    fn endpoint(&self) -> String {
        format!("{}/openai/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
    async fn send(&self, request: &CallRequest) -> Result<String> {
        let body = build_chat_body(&self.model, request);
        let builder = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key));

        let json = post_json(ProviderId::Groq, builder, &body).await?;
        extract_chat_text(&json).ok_or_else(|| missing_text(ProviderId::Groq))
    }

    fn id(&self) -> ProviderId {
        ProviderId::Groq
    }

    fn model(&self) -> &str {
        &self.model
    }
}

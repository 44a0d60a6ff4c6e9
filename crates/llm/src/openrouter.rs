//! OpenRouter chat client over the OpenAI-compatible `/chat/completions`
//! endpoint. Requires `OPENROUTER_API_KEY`.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{ChatMessage, ChatProvider, HealthStatus, LlmError};

const OPENROUTER_BASE: &str = "https://openrouter.ai/api/v1";

#[derive(Debug)]
pub struct OpenRouterClient {
    client: reqwest::Client,
    model: String,
    cached_health: Mutex<Option<HealthStatus>>,
}

impl OpenRouterClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            cached_health: Mutex::new(None),
        }
    }

    fn api_key() -> Option<String> {
        std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    async fn probe(&self) -> HealthStatus {
        let Some(api_key) = Self::api_key() else {
            return HealthStatus::unhealthy("OPENROUTER_API_KEY not set");
        };
        let endpoint = format!("{OPENROUTER_BASE}/models");
        match self.client.get(&endpoint).bearer_auth(api_key).send().await {
            Ok(response) if response.status().is_success() => {
                HealthStatus::healthy(self.model.clone())
            }
            Ok(response) => {
                HealthStatus::unhealthy(format!("openrouter returned status {}", response.status()))
            }
            Err(err) => HealthStatus::unhealthy(format!("openrouter unreachable: {err}")),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
    async fn check_health(&self, force: bool) -> HealthStatus {
        let mut cached = self.cached_health.lock().await;
        if !force {
            if let Some(status) = cached.as_ref() {
                return status.clone();
            }
        }
        let status = self.probe().await;
        if !status.healthy {
            warn!(error = ?status.error, "openrouter health probe failed");
        }
        *cached = Some(status.clone());
        status
    }

    async fn chat_complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let api_key = Self::api_key().ok_or(LlmError::MissingKey("openrouter"))?;
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature
        });

        debug!(model = %self.model, messages = messages.len(), "openrouter chat request");
        let response = self
            .client
            .post(format!("{OPENROUTER_BASE}/chat/completions"))
            .bearer_auth(&api_key)
            .header("HTTP-Referer", "https://recap.local")
            .header("X-Title", "Recap")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Api { status: status.as_u16(), message: body.to_string() });
        }

        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or(LlmError::MissingContent)
    }
}

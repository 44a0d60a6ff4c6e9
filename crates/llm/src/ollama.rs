//! Ollama chat client over the local `/api/chat` endpoint.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{ChatMessage, ChatProvider, HealthStatus, LlmError};

#[derive(Debug)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    cached_health: Mutex<Option<HealthStatus>>,
}

impl OllamaClient {
    /// Build a client for `model`. The base URL comes from `OLLAMA_BASE_URL`
    /// when set, falling back to the local default.
    pub fn new(model: impl Into<String>) -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        Self::with_base_url(model, base_url)
    }

    pub fn with_base_url(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            cached_health: Mutex::new(None),
        }
    }

    async fn probe(&self) -> HealthStatus {
        let endpoint = format!("{}/api/tags", self.base_url);
        match self.client.get(&endpoint).send().await {
            Ok(response) if response.status().is_success() => {
                let body: serde_json::Value = match response.json().await {
                    Ok(body) => body,
                    Err(err) => return HealthStatus::unhealthy(format!("bad tags response: {err}")),
                };
                let listed = body
                    .get("models")
                    .and_then(|m| m.as_array())
                    .map(|models| {
                        models.iter().any(|m| {
                            m.get("name").and_then(|n| n.as_str()) == Some(self.model.as_str())
                        })
                    })
                    .unwrap_or(false);
                if listed {
                    HealthStatus::healthy(self.model.clone())
                } else {
                    // The daemon is up; the model will be pulled on first use.
                    HealthStatus { healthy: true, loaded_model: None, error: None }
                }
            }
            Ok(response) => {
                HealthStatus::unhealthy(format!("ollama returned status {}", response.status()))
            }
            Err(err) => {
                HealthStatus::unhealthy(format!("ollama unavailable at {}: {err}", self.base_url))
            }
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    async fn check_health(&self, force: bool) -> HealthStatus {
        let mut cached = self.cached_health.lock().await;
        if !force {
            if let Some(status) = cached.as_ref() {
                return status.clone();
            }
        }
        let status = self.probe().await;
        if !status.healthy {
            warn!(error = ?status.error, "ollama health probe failed");
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
        let endpoint = format!("{}/api/chat", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": max_tokens,
                "temperature": temperature
            }
        });

        debug!(model = %self.model, messages = messages.len(), "ollama chat request");
        let response = self.client.post(&endpoint).json(&payload).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(LlmError::Api { status: status.as_u16(), message: body.to_string() });
        }

        body.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(LlmError::MissingContent)
    }
}

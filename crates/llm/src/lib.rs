//! LLM provider interface — chat messages, health probing, and the
//! Ollama/OpenRouter client implementations.
//!
//! The core treats the provider as an opaque capability: an ordered list of
//! `(role, content)` messages in, one text completion out. Everything that
//! comes back is untrusted; see [`coerce`] for the defensive parsing layer.

pub mod coerce;

mod ollama;
mod openrouter;

pub use ollama::OllamaClient;
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Chat message types ────────────────────────────────────────────────────────

/// Role in a chat conversation. The core only ever sends system and user
/// messages; assistant turns exist solely inside the provider response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// A single message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

// ── Health ────────────────────────────────────────────────────────────────────

/// Result of a provider health probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub loaded_model: Option<String>,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(model: impl Into<String>) -> Self {
        Self { healthy: true, loaded_model: Some(model.into()), error: None }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self { healthy: false, loaded_model: None, error: Some(error.into()) }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure modes of a single provider call. Transport and API failures are
/// typed so the pipeline can apply its per-chunk retry semantics; malformed
/// *content* is never an error here — that is the coercer's job.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("response carried no message content")]
    MissingContent,

    #[error("no API key configured for {0}")]
    MissingKey(&'static str),
}

// ── Provider trait ────────────────────────────────────────────────────────────

/// Object-safe chat completion capability.
///
/// Implementations must be pure with respect to the request: no state is
/// carried across calls other than an optional cached health result.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Probe provider health. Implementations may cache the result;
    /// `force` bypasses any cache.
    async fn check_health(&self, force: bool) -> HealthStatus;

    /// Send an ordered message list and return the raw completion text.
    async fn chat_complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ctors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChatRole::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
    }

    #[test]
    fn health_status_ctors() {
        let ok = HealthStatus::healthy("llama3.1:8b");
        assert!(ok.healthy);
        assert_eq!(ok.loaded_model.as_deref(), Some("llama3.1:8b"));

        let bad = HealthStatus::unhealthy("connection refused");
        assert!(!bad.healthy);
        assert_eq!(bad.error.as_deref(), Some("connection refused"));
    }
}

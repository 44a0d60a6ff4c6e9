//! Scripted provider for driving the pipeline deterministically.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use recap_llm::{ChatMessage, ChatProvider, ChatRole, HealthStatus, LlmError};

/// Route pipeline logs through the test writer. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("recap_session=debug")
        .with_test_writer()
        .try_init();
}

/// One scripted reply: a canned response body, or a simulated call failure.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::Ok(body.into())
    }
}

/// A [`ChatProvider`] that routes calls by their system prompt and pops
/// scripted replies per kind, falling back to a per-kind default.
pub struct MockProvider {
    pub healthy: bool,
    detection: Mutex<VecDeque<Reply>>,
    relevance: Mutex<VecDeque<Reply>>,
    extraction: Mutex<VecDeque<Reply>>,
    default_detection: String,
    default_relevance: String,
    default_extraction: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            healthy: true,
            detection: Mutex::new(VecDeque::new()),
            relevance: Mutex::new(VecDeque::new()),
            extraction: Mutex::new(VecDeque::new()),
            default_detection: r#"{"title":"Q4 budget","goal":"Plan the Q4 budget","keywords":["budget","q4","forecast","headcount","runway"]}"#
                .to_string(),
            default_relevance:
                r#"{"relevanceType":"in_scope_important","score":0.9,"reasoning":"on topic"}"#
                    .to_string(),
            default_extraction:
                r#"{"keyPoints":[],"decisions":[],"actionItems":[],"tasks":[],"otherNotes":[]}"#
                    .to_string(),
        }
    }
}

impl MockProvider {
    /// A provider whose health probe fails.
    pub fn unhealthy() -> Self {
        Self { healthy: false, ..Self::default() }
    }

    pub fn push_detection(&self, reply: Reply) {
        self.detection.lock().unwrap().push_back(reply);
    }

    pub fn push_relevance(&self, reply: Reply) {
        self.relevance.lock().unwrap().push_back(reply);
    }

    pub fn push_extraction(&self, reply: Reply) {
        self.extraction.lock().unwrap().push_back(reply);
    }

    fn next(&self, queue: &Mutex<VecDeque<Reply>>, default: &str) -> Result<String, LlmError> {
        let reply = queue.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Ok(body)) => Ok(body),
            Some(Reply::Fail) => Err(LlmError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            }),
            None => Ok(default.to_string()),
        }
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    async fn check_health(&self, _force: bool) -> HealthStatus {
        if self.healthy {
            HealthStatus::healthy("mock-model")
        } else {
            HealthStatus::unhealthy("mock provider down")
        }
    }

    async fn chat_complete(
        &self,
        messages: &[ChatMessage],
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, LlmError> {
        let system = messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if system.contains("identify the subject") {
            self.next(&self.detection, &self.default_detection)
        } else if system.contains("classify whether") {
            self.next(&self.relevance, &self.default_relevance)
        } else if system.contains("extract structured meeting notes") {
            self.next(&self.extraction, &self.default_extraction)
        } else {
            Ok("{}".to_string())
        }
    }
}

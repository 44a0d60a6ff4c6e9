use thiserror::Error;

/// Error kinds surfaced by the note generation core.
///
/// Malformed LLM JSON is *not* represented here — the coercer always recovers
/// with defaults, so it never propagates as an error.
#[derive(Debug, Error)]
pub enum NoteError {
    /// No healthy LLM provider. Fatal to session start.
    #[error("no healthy LLM provider available: {0}")]
    LlmUnavailable(String),

    /// A single LLM call failed. Transient; the affected chunk is retried on
    /// the next tick.
    #[error("LLM call failed: {0}")]
    LlmCallFailed(String),

    /// A repository operation failed for one record. Logged, skipped, and
    /// counted — never aborts the run on its own.
    #[error("repository operation failed: {0}")]
    Repository(String),

    /// A segment or parameter failed validation and was dropped.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation was requested on a session in the wrong state.
    #[error("session inactive: {0}")]
    SessionInactive(String),

    /// A finalization step failed. Fatal to the session.
    #[error("finalization failed during {step}: {message}")]
    Finalization { step: &'static str, message: String },
}

impl NoteError {
    /// Whether the session can continue after this error.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::LlmCallFailed(_) | Self::Repository(_) | Self::InvalidInput(_)
        )
    }

    /// Short machine-readable code for event payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LlmUnavailable(_) => "llm_unavailable",
            Self::LlmCallFailed(_) => "llm_call_failed",
            Self::Repository(_) => "repository_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::SessionInactive(_) => "session_inactive",
            Self::Finalization { .. } => "finalization_failed",
        }
    }
}

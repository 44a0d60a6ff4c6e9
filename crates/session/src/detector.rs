//! Subject detection — asks the model what the meeting is about and coerces
//! the answer into a [`SubjectDetection`] for the estimator.

use chrono::{DateTime, Utc};
use tracing::debug;

use recap_core::{Chunk, NoteError, Subject};
use recap_llm::{ChatMessage, ChatProvider, coerce};
use recap_subject::SubjectDetection;

const SYSTEM_PROMPT: &str = "You identify the subject of an ongoing meeting from a transcript \
excerpt. Respond with JSON only: {\"title\": string, \"goal\": string, \"keywords\": [string]}. \
The title is a short noun phrase naming the topic. The goal is one sentence describing what the \
participants are trying to achieve. Keywords are specific terms that define the topic's scope — \
include as many as the transcript supports.";

/// Run one subject detection over a chunk.
///
/// A transport or API failure is an error (the chunk retries); a response the
/// coercer cannot salvage is simply no detection.
pub async fn detect_subject(
    provider: &dyn ChatProvider,
    chunk: &Chunk,
    prior: Option<&Subject>,
    max_tokens: u32,
    temperature: f32,
    now: DateTime<Utc>,
) -> Result<Option<SubjectDetection>, NoteError> {
    let mut user = String::new();
    if let Some(prior) = prior {
        user.push_str(&format!(
            "Current working subject: \"{}\" (goal: {}). Refine it if the conversation has \
             moved on, otherwise confirm it.\n\n",
            prior.title, prior.goal
        ));
    }
    user.push_str("Transcript excerpt:\n\n");
    user.push_str(&chunk.content);

    let response = provider
        .chat_complete(
            &[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
            max_tokens,
            temperature,
        )
        .await
        .map_err(|err| NoteError::LlmCallFailed(err.to_string()))?;

    let Some(value) = coerce::extract_json_value(&response) else {
        debug!(chunk = chunk.chunk_index, "subject detection yielded no parseable JSON");
        return Ok(None);
    };

    let title = coerce::str_or_empty(&value, "title");
    if title.is_empty() {
        return Ok(None);
    }
    let keywords: Vec<String> = coerce::array_of(&value, "keywords")
        .iter()
        .filter_map(|k| k.as_str())
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    Ok(Some(SubjectDetection {
        title,
        goal: coerce::str_or_empty(&value, "goal"),
        keywords,
        detected_at: now,
        chunk_window_start_ms: chunk.window_start_ms,
        chunk_window_end_ms: chunk.window_end_ms,
    }))
}

//! Relevance classification of one chunk against a subject.
//!
//! Stateless: every call carries the full subject and content, and malformed
//! model output coerces to `unclear` at score 0.5 rather than failing.

use tracing::debug;

use recap_core::{NoteError, RelevanceType, StrictnessMode, Subject};
use recap_llm::{ChatMessage, ChatProvider, coerce};

const SYSTEM_PROMPT: &str = "You classify whether a meeting transcript excerpt is relevant to \
the meeting's subject. Use exactly one of these labels:\n\
- in_scope_important: substantive discussion advancing the subject\n\
- in_scope_minor: on-topic but peripheral detail\n\
- out_of_scope: unrelated to the subject\n\
- unclear: cannot tell from this excerpt\n\
Treat the following as noise, not substance: greetings, small talk, repetition of earlier \
points, inconclusive brainstorming, and tangents.\n\
Respond with JSON only: {\"relevanceType\": string, \"score\": number between 0 and 1, \
\"reasoning\": string}.";

/// A coerced relevance assessment.
#[derive(Debug, Clone)]
pub struct RelevanceAssessment {
    pub relevance_type: RelevanceType,
    pub score: f32,
    pub reasoning: Option<String>,
}

/// Score one chunk's content against a subject.
pub async fn classify_relevance(
    provider: &dyn ChatProvider,
    subject: &Subject,
    chunk_content: &str,
    strictness: StrictnessMode,
    max_tokens: u32,
    temperature: f32,
) -> Result<RelevanceAssessment, NoteError> {
    let user = format!(
        "Subject: {title}\nGoal: {goal}\nScope keywords: {keywords}\nStrictness mode: {mode}\n\n\
         Transcript excerpt:\n\n{content}",
        title = subject.title,
        goal = subject.goal,
        keywords = subject.scope_keywords.join(", "),
        mode = strictness.as_str(),
        content = chunk_content,
    );

    let response = provider
        .chat_complete(
            &[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
            max_tokens,
            temperature,
        )
        .await
        .map_err(|err| NoteError::LlmCallFailed(err.to_string()))?;

    Ok(coerce_assessment(&response))
}

/// Coerce a raw model response into an assessment, defaulting hard.
fn coerce_assessment(response: &str) -> RelevanceAssessment {
    let Some(value) = coerce::extract_json_value(response) else {
        debug!("relevance response had no parseable JSON; defaulting to unclear");
        return RelevanceAssessment {
            relevance_type: RelevanceType::Unclear,
            score: 0.5,
            reasoning: Some(String::new()),
        };
    };

    let relevance_type = RelevanceType::parse_lenient(&coerce::str_or_empty(&value, "relevanceType"));
    let score = coerce::unit_score(&value, "score", 0.5);
    // Missing or mistyped reasoning coerces to an empty string, not null.
    let reasoning = Some(coerce::str_or_empty(&value, "reasoning"));

    RelevanceAssessment { relevance_type, score, reasoning }
}

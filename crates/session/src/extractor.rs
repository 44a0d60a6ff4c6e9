//! Candidate extraction — turns one chunk into structured note candidates.
//!
//! Extraction is deliberately generous: strictness filtering happens only at
//! finalization, so widening the mode later can recover items produced here.
//! What *is* enforced here: per-array caps, intra-batch near-duplicate
//! rejection, and action-item validation (failures demote to plain tasks).

use serde_json::Value;
use tracing::{debug, warn};

use recap_core::{Candidate, Chunk, NoteError, NoteType, Priority, Subject};
use recap_llm::{ChatMessage, ChatProvider, coerce};

use crate::similarity;
use crate::validator;

/// Maximum items accepted per extraction array.
const MAX_ITEMS_PER_KIND: usize = 5;

const SYSTEM_PROMPT: &str = "You extract structured meeting notes from a transcript excerpt. \
Respond with JSON only:\n\
{\"keyPoints\": [], \"decisions\": [], \"actionItems\": [], \"tasks\": [], \"otherNotes\": []}\n\
Each array holds at most five items of the form {\"content\": string}. Action items may also \
carry \"assignee\", \"deadline\", and \"priority\" (high, medium, or low). Only extract what was \
actually said; do not invent owners or dates. Leave arrays empty when nothing qualifies.";

/// One parsed item before it becomes a candidate.
#[derive(Debug, Clone, Default)]
struct RawItem {
    content: String,
    assignee: Option<String>,
    deadline: Option<String>,
    priority: Option<Priority>,
    speaker: Option<String>,
}

/// Extract, dedup, and validate candidates for one chunk.
pub async fn extract_candidates(
    provider: &dyn ChatProvider,
    subject: Option<&Subject>,
    chunk: &Chunk,
    llm_validation: bool,
    max_tokens: u32,
    temperature: f32,
) -> Result<Vec<Candidate>, NoteError> {
    let mut user = String::new();
    if let Some(subject) = subject {
        user.push_str(&format!(
            "Meeting subject: {} (goal: {}; scope: {})\n\n",
            subject.title,
            subject.goal,
            subject.scope_keywords.join(", "),
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
        debug!(chunk = chunk.chunk_index, "extraction yielded no parseable JSON");
        return Ok(Vec::new());
    };

    let mut accepted: Vec<Candidate> = Vec::new();
    let batches: [(NoteType, Vec<RawItem>); 5] = [
        (NoteType::KeyPoint, parse_items(&value, "keyPoints", "key_points")),
        (NoteType::Decision, parse_items(&value, "decisions", "decisions")),
        (NoteType::ActionItem, parse_items(&value, "actionItems", "action_items")),
        (NoteType::Task, parse_items(&value, "tasks", "tasks")),
        (NoteType::OtherNote, parse_items(&value, "otherNotes", "other_notes")),
    ];

    for (note_type, items) in batches {
        for item in items {
            if similarity::is_near_duplicate(
                &item.content,
                accepted.iter().map(|c| c.content.as_str()),
            ) {
                debug!(content = %item.content, "intra-batch near-duplicate rejected");
                continue;
            }

            let mut candidate =
                Candidate::new(chunk.meeting_id, Some(chunk.id), note_type, item.content.clone());
            candidate.assignee = item.assignee.clone();
            candidate.deadline = item.deadline.clone();
            candidate.priority = item.priority;
            candidate.speaker_id = item.speaker.clone();
            candidate.source_segment_ids = chunk.segment_ids.clone();

            if note_type == NoteType::ActionItem {
                apply_validation(provider, &mut candidate, subject, chunk, llm_validation, max_tokens)
                    .await;
            }
            accepted.push(candidate);
        }
    }

    debug!(chunk = chunk.chunk_index, candidates = accepted.len(), "extraction complete");
    Ok(accepted)
}

/// Run the four-criteria check, demoting failures to tasks. With
/// `llm_validation` enabled, a rule failure gets a second opinion that may
/// rescue the item by asserting all criteria pass.
async fn apply_validation(
    provider: &dyn ChatProvider,
    candidate: &mut Candidate,
    subject: Option<&Subject>,
    chunk: &Chunk,
    llm_validation: bool,
    max_tokens: u32,
) {
    let outcome = validator::validate_action_item(
        &candidate.content,
        candidate.assignee.as_deref(),
        candidate.deadline.as_deref(),
        subject,
        &chunk.content,
    );
    if outcome.valid {
        return;
    }

    if llm_validation {
        let rescued = validator::llm_override(
            provider,
            &candidate.content,
            candidate.assignee.as_deref(),
            candidate.deadline.as_deref(),
            max_tokens,
            0.0,
        )
        .await;
        if let Some(reasoning) = rescued {
            debug!(content = %candidate.content, %reasoning, "action item rescued by llm validator");
            return;
        }
    }

    warn!(
        content = %candidate.content,
        reason = ?outcome.failures,
        "action item demoted to task"
    );
    candidate.note_type = NoteType::Task;
    candidate.exclusion_reason = outcome.reason();
}

/// Parse one extraction array, tolerating camelCase or snake_case keys,
/// bare-string items, and missing fields. Capped at five items.
fn parse_items(value: &Value, key: &str, alt_key: &str) -> Vec<RawItem> {
    let mut raw = coerce::array_of(value, key);
    if raw.is_empty() {
        raw = coerce::array_of(value, alt_key);
    }

    raw.iter()
        .filter_map(|item| match item {
            Value::String(s) => {
                let content = s.trim().to_string();
                (!content.is_empty()).then(|| RawItem { content, ..RawItem::default() })
            }
            Value::Object(_) => {
                let content = coerce::opt_str(item, "content")?;
                Some(RawItem {
                    content,
                    assignee: coerce::opt_str(item, "assignee"),
                    deadline: coerce::opt_str(item, "deadline"),
                    priority: coerce::opt_str(item, "priority")
                        .map(|p| Priority::parse_lenient(&p)),
                    speaker: coerce::opt_str(item, "speaker"),
                })
            }
            _ => None,
        })
        .take(MAX_ITEMS_PER_KIND)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_items_caps_at_five() {
        let value = json!({
            "keyPoints": (0..8).map(|i| json!({"content": format!("point {i}")})).collect::<Vec<_>>()
        });
        assert_eq!(parse_items(&value, "keyPoints", "key_points").len(), 5);
    }

    #[test]
    fn parse_items_accepts_snake_case_fallback() {
        let value = json!({"key_points": [{"content": "from snake"}]});
        let items = parse_items(&value, "keyPoints", "key_points");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "from snake");
    }

    #[test]
    fn parse_items_accepts_bare_strings() {
        let value = json!({"decisions": ["ship it", "  ", 42]});
        let items = parse_items(&value, "decisions", "decisions");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "ship it");
    }

    #[test]
    fn parse_items_reads_action_fields() {
        let value = json!({
            "actionItems": [{
                "content": "Send the deck",
                "assignee": "Alice",
                "deadline": "2025-03-15",
                "priority": "HIGH"
            }]
        });
        let items = parse_items(&value, "actionItems", "action_items");
        assert_eq!(items[0].assignee.as_deref(), Some("Alice"));
        assert_eq!(items[0].deadline.as_deref(), Some("2025-03-15"));
        assert_eq!(items[0].priority, Some(Priority::High));
    }

    #[test]
    fn parse_items_drops_items_without_content() {
        let value = json!({"tasks": [{"assignee": "Bob"}, {"content": "real task"}]});
        let items = parse_items(&value, "tasks", "tasks");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "real task");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Wire enums ────────────────────────────────────────────────────────────────

/// How a chunk's content relates to the meeting subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceType {
    InScopeImportant,
    InScopeMinor,
    OutOfScope,
    Unclear,
}

impl RelevanceType {
    /// Parse a model-supplied label, falling back to [`RelevanceType::Unclear`]
    /// for anything unrecognized.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "in_scope_important" => Self::InScopeImportant,
            "in_scope_minor" => Self::InScopeMinor,
            "out_of_scope" => Self::OutOfScope,
            _ => Self::Unclear,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InScopeImportant => "in_scope_important",
            Self::InScopeMinor => "in_scope_minor",
            Self::OutOfScope => "out_of_scope",
            Self::Unclear => "unclear",
        }
    }
}

/// The five candidate kinds an extraction pass can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    KeyPoint,
    Decision,
    ActionItem,
    Task,
    OtherNote,
}

impl NoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyPoint => "key_point",
            Self::Decision => "decision",
            Self::ActionItem => "action_item",
            Self::Task => "task",
            Self::OtherNote => "other_note",
        }
    }
}

/// Persisted note kinds. Candidates map onto these at finalization
/// (`task` collapses into `action_item`, `other_note` becomes `custom`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    KeyPoint,
    Decision,
    ActionItem,
    Custom,
}

/// Output filtering policy applied at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictnessMode {
    #[default]
    Strict,
    Balanced,
    Loose,
}

impl StrictnessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Loose => "loose",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Parse a model-supplied priority, defaulting to medium.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectStatus {
    Draft,
    Locked,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Active,
    Processing,
    Paused,
    Finalizing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
}

// ── Transcript input ──────────────────────────────────────────────────────────

/// A timestamped, speaker-attributed transcript segment supplied by the
/// ingestion source. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Producer-supplied id, unique within the session.
    pub id: String,
    pub content: String,
    /// Speaker label taken verbatim from diarization; never inferred from text.
    pub speaker: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

// ── Chunks ────────────────────────────────────────────────────────────────────

/// A contiguous window of segments formatted for one LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub meeting_id: Uuid,
    /// Monotonic from 0, contiguous within a session.
    pub chunk_index: u32,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    /// Speaker-merged transcript text (`"[SPEAKER]: ..."` lines).
    pub content: String,
    pub speaker_ids: Vec<String>,
    pub segment_ids: Vec<String>,
}

// ── Subject ───────────────────────────────────────────────────────────────────

/// The meeting subject — mutable while `Draft`, immutable once `Locked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub title: String,
    pub goal: String,
    /// Ordered, unique, size within the configured keyword bounds.
    pub scope_keywords: Vec<String>,
    pub status: SubjectStatus,
    pub strictness_mode: StrictnessMode,
    pub confidence_score: f32,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Append-only record of one successful subject detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectHistoryEntry {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub title: String,
    pub goal: String,
    pub keywords: Vec<String>,
    pub confidence: f32,
    pub detected_at: DateTime<Utc>,
    pub chunk_window_start_ms: i64,
    pub chunk_window_end_ms: i64,
}

// ── Relevance ─────────────────────────────────────────────────────────────────

/// A relevance assessment for one chunk. At most one non-final (live pass)
/// and one final (scored against the locked subject) label per chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceLabel {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub chunk_id: Uuid,
    pub relevance_type: RelevanceType,
    pub score: f32,
    pub reasoning: Option<String>,
    pub is_final: bool,
    pub created_at: DateTime<Utc>,
}

// ── Candidates ────────────────────────────────────────────────────────────────

/// An extracted note item awaiting finalization.
///
/// Created by the extractor with `is_final = false`; only the finalizer sets
/// `is_final`, `is_duplicate`, `included_in_output`, and `exclusion_reason`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub chunk_id: Option<Uuid>,
    pub note_type: NoteType,
    pub content: String,
    pub speaker_id: Option<String>,
    pub assignee: Option<String>,
    pub deadline: Option<String>,
    pub priority: Option<Priority>,
    pub relevance_type: Option<RelevanceType>,
    pub relevance_score: Option<f32>,
    pub is_duplicate: bool,
    pub is_final: bool,
    pub included_in_output: bool,
    pub exclusion_reason: Option<String>,
    pub source_segment_ids: Vec<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Candidate {
    /// Fresh candidate as the extractor produces it.
    pub fn new(meeting_id: Uuid, chunk_id: Option<Uuid>, note_type: NoteType, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            meeting_id,
            chunk_id,
            note_type,
            content,
            speaker_id: None,
            assignee: None,
            deadline: None,
            priority: None,
            relevance_type: None,
            relevance_score: None,
            is_duplicate: false,
            is_final: false,
            included_in_output: false,
            exclusion_reason: None,
            source_segment_ids: Vec::new(),
            finalized_at: None,
        }
    }
}

// ── Persisted outputs ─────────────────────────────────────────────────────────

/// A note record as handed to the note repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub content: String,
    pub note_kind: NoteKind,
    pub is_ai_generated: bool,
    pub source_segment_ids: Vec<String>,
    pub context: Option<String>,
    pub confidence: Option<f32>,
    pub speaker_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A task record as handed to the task repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub due_date: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

// ── Structured output ─────────────────────────────────────────────────────────

/// One item of the final structured output, bucketed by its original
/// candidate note type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputItem {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub source_segment_ids: Vec<String>,
}

impl From<&Candidate> for OutputItem {
    fn from(c: &Candidate) -> Self {
        Self {
            content: c.content.clone(),
            speaker_id: c.speaker_id.clone(),
            assignee: c.assignee.clone(),
            deadline: c.deadline.clone(),
            priority: c.priority,
            source_segment_ids: c.source_segment_ids.clone(),
        }
    }
}

/// The filtered note bundle produced exactly once per successful finalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub subject: Option<Subject>,
    pub key_points: Vec<OutputItem>,
    pub decisions: Vec<OutputItem>,
    pub action_items: Vec<OutputItem>,
    pub tasks: Vec<OutputItem>,
    pub other_notes: Vec<OutputItem>,
}

// ── Audit trail ───────────────────────────────────────────────────────────────

/// How a chunk's relevance shifted between the live pass and the final
/// re-check against the locked subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceChange {
    pub chunk_id: Uuid,
    pub draft_relevance: Option<RelevanceType>,
    pub final_relevance: RelevanceType,
    pub draft_score: Option<f32>,
    pub final_score: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuditTotals {
    pub candidates: usize,
    pub included: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub notes_created: usize,
    pub tasks_created: usize,
    pub persistence_errors: usize,
}

/// Complete record of what finalization kept, dropped, and why.
///
/// `filtered_candidates` and `included_candidates` are disjoint and together
/// cover every candidate of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTrail {
    pub session_id: Uuid,
    pub locked_subject: Option<Subject>,
    pub draft_subject_history: Vec<SubjectHistoryEntry>,
    pub relevance_changes: Vec<RelevanceChange>,
    pub filtered_candidates: Vec<Candidate>,
    pub included_candidates: Vec<Candidate>,
    pub totals: AuditTotals,
    pub finalized_at: DateTime<Utc>,
    pub strictness_mode: StrictnessMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevance_parse_lenient_covers_known_labels() {
        assert_eq!(
            RelevanceType::parse_lenient("in_scope_important"),
            RelevanceType::InScopeImportant
        );
        assert_eq!(RelevanceType::parse_lenient("  OUT_OF_SCOPE "), RelevanceType::OutOfScope);
        assert_eq!(RelevanceType::parse_lenient("in_scope_minor"), RelevanceType::InScopeMinor);
    }

    #[test]
    fn relevance_parse_lenient_defaults_to_unclear() {
        assert_eq!(RelevanceType::parse_lenient("somewhat relevant"), RelevanceType::Unclear);
        assert_eq!(RelevanceType::parse_lenient(""), RelevanceType::Unclear);
    }

    #[test]
    fn priority_parse_lenient_defaults_to_medium() {
        assert_eq!(Priority::parse_lenient("HIGH"), Priority::High);
        assert_eq!(Priority::parse_lenient("whenever"), Priority::Medium);
        assert_eq!(Priority::parse_lenient("low"), Priority::Low);
    }

    #[test]
    fn strictness_default_is_strict() {
        assert_eq!(StrictnessMode::default(), StrictnessMode::Strict);
    }

    #[test]
    fn candidate_new_starts_unfinalized() {
        let c = Candidate::new(Uuid::new_v4(), None, NoteType::KeyPoint, "point".into());
        assert!(!c.is_final);
        assert!(!c.is_duplicate);
        assert!(!c.included_in_output);
        assert!(c.exclusion_reason.is_none());
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&RelevanceType::InScopeImportant).unwrap(),
            "\"in_scope_important\""
        );
        assert_eq!(serde_json::to_string(&NoteType::ActionItem).unwrap(), "\"action_item\"");
        assert_eq!(serde_json::to_string(&SessionStatus::Finalizing).unwrap(), "\"finalizing\"");
        assert_eq!(serde_json::to_string(&NoteKind::Custom).unwrap(), "\"custom\"");
    }
}

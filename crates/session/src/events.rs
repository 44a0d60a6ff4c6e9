//! UI-facing events emitted by the session controller and finalizer.
//!
//! Events are broadcast in the same order the state transitions occurred.
//! Payload timestamps are unix milliseconds.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use recap_core::{AuditTrail, Candidate, RelevanceType, SessionStatus, StructuredOutput, Subject};
use recap_subject::ConfidenceStatus;

/// Subject stability snapshot carried on `subject` and `confidence` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceInfo {
    pub score: f32,
    pub status: ConfidenceStatus,
    pub message: String,
    pub detection_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NoteEvent {
    /// Emitted on every session state transition.
    #[serde(rename_all = "camelCase")]
    Status { meeting_id: Uuid, status: SessionStatus, at_ms: i64 },

    /// Current subject snapshot after a successful detection.
    #[serde(rename_all = "camelCase")]
    Subject {
        meeting_id: Uuid,
        subject: Subject,
        is_draft: bool,
        confidence: ConfidenceInfo,
        at_ms: i64,
    },

    /// Standalone stability update.
    #[serde(rename_all = "camelCase")]
    Confidence {
        meeting_id: Uuid,
        score: f32,
        status: ConfidenceStatus,
        message: String,
        detection_count: usize,
        last_updated_ms: i64,
        at_ms: i64,
    },

    /// The candidate batch just produced. Non-final — observation only.
    #[serde(rename_all = "camelCase")]
    Candidates {
        meeting_id: Uuid,
        chunk_index: u32,
        candidates: Vec<Candidate>,
        at_ms: i64,
    },

    /// One relevance assessment, live or final.
    #[serde(rename_all = "camelCase")]
    Relevance {
        meeting_id: Uuid,
        chunk_id: Uuid,
        relevance_type: RelevanceType,
        score: f32,
        is_final: bool,
        at_ms: i64,
    },

    /// Chunk pipeline bookkeeping.
    #[serde(rename_all = "camelCase")]
    BatchState {
        meeting_id: Uuid,
        is_processing: bool,
        pending_segment_count: usize,
        chunks_processed: u32,
        last_batch_start_ms: Option<i64>,
        last_batch_complete_ms: Option<i64>,
        at_ms: i64,
    },

    #[serde(rename_all = "camelCase")]
    Error {
        meeting_id: Uuid,
        code: String,
        message: String,
        recoverable: bool,
        at_ms: i64,
    },

    /// Persistence counts after finalization writes.
    #[serde(rename_all = "camelCase")]
    Persisted { meeting_id: Uuid, notes_count: usize, tasks_count: usize, at_ms: i64 },

    #[serde(rename_all = "camelCase")]
    FinalizationComplete {
        meeting_id: Uuid,
        notes_count: usize,
        tasks_count: usize,
        filtered_count: usize,
        final_output: StructuredOutput,
        audit_trail: AuditTrail,
        at_ms: i64,
    },
}

/// Thin wrapper over a broadcast channel; sends are best-effort and a lagging
/// or absent receiver never blocks the pipeline.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<NoteEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: NoteEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

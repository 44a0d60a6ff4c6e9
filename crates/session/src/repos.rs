//! Repository seams — one narrow trait per record store, plus an in-memory
//! bundle used by tests and embedders without external storage.
//!
//! Repositories are synchronous from the core's perspective and are only ever
//! touched from the single session task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use recap_core::{
    Candidate, Chunk, NoteError, NoteRecord, RelevanceLabel, SessionStatus, Subject,
    SubjectHistoryEntry, TaskRecord,
};

// ── Traits ────────────────────────────────────────────────────────────────────

pub trait SubjectRepo: Send {
    fn upsert_draft(&mut self, subject: &Subject) -> Result<(), NoteError>;
    fn lock(&mut self, subject: &Subject) -> Result<(), NoteError>;
    fn get_by_meeting(&self, meeting_id: Uuid) -> Result<Option<Subject>, NoteError>;
}

pub trait SubjectHistoryRepo: Send {
    fn append(&mut self, entry: &SubjectHistoryEntry) -> Result<(), NoteError>;
    /// Ordered descending by `detected_at`.
    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<SubjectHistoryEntry>, NoteError>;
}

pub trait ChunkRepo: Send {
    fn insert(&mut self, chunk: &Chunk) -> Result<(), NoteError>;
    /// Ordered by `chunk_index`.
    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<Chunk>, NoteError>;
}

pub trait RelevanceLabelRepo: Send {
    fn insert(&mut self, label: &RelevanceLabel) -> Result<(), NoteError>;
    fn update_by_id(&mut self, label: &RelevanceLabel) -> Result<(), NoteError>;
    fn get_by_chunk(&self, chunk_id: Uuid) -> Result<Vec<RelevanceLabel>, NoteError>;
    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<RelevanceLabel>, NoteError>;
}

pub trait CandidateRepo: Send {
    fn insert(&mut self, candidate: &Candidate) -> Result<(), NoteError>;
    /// Overwrite the finalization-owned fields of an existing candidate.
    fn update_finalization_fields(&mut self, candidate: &Candidate) -> Result<(), NoteError>;
    /// Insertion order, which follows chunk order.
    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<Candidate>, NoteError>;
    fn list_included(&self, meeting_id: Uuid) -> Result<Vec<Candidate>, NoteError>;
}

pub trait SessionRepo: Send {
    fn insert(&mut self, meeting_id: Uuid, status: SessionStatus) -> Result<(), NoteError>;
    fn update_status(&mut self, meeting_id: Uuid, status: SessionStatus) -> Result<(), NoteError>;
}

pub trait NoteRepo: Send {
    fn create(&mut self, note: &NoteRecord) -> Result<(), NoteError>;
}

pub trait TaskRepo: Send {
    fn create(&mut self, task: &TaskRecord) -> Result<(), NoteError>;
}

/// The full set of repositories the session writes through.
pub struct Repositories {
    pub subjects: Box<dyn SubjectRepo>,
    pub subject_history: Box<dyn SubjectHistoryRepo>,
    pub chunks: Box<dyn ChunkRepo>,
    pub relevance: Box<dyn RelevanceLabelRepo>,
    pub candidates: Box<dyn CandidateRepo>,
    pub sessions: Box<dyn SessionRepo>,
    pub notes: Box<dyn NoteRepo>,
    pub tasks: Box<dyn TaskRepo>,
}

impl Repositories {
    /// An in-memory bundle plus a handle for inspecting what was written.
    pub fn in_memory() -> (Self, InMemoryStore) {
        let store = InMemoryStore::default();
        let repos = Self {
            subjects: Box::new(store.clone()),
            subject_history: Box::new(store.clone()),
            chunks: Box::new(store.clone()),
            relevance: Box::new(store.clone()),
            candidates: Box::new(store.clone()),
            sessions: Box::new(store.clone()),
            notes: Box::new(store.clone()),
            tasks: Box::new(store.clone()),
        };
        (repos, store)
    }
}

// ── In-memory implementation ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Shared {
    subjects: Vec<Subject>,
    history: Vec<SubjectHistoryEntry>,
    chunks: Vec<Chunk>,
    labels: Vec<RelevanceLabel>,
    candidates: Vec<Candidate>,
    sessions: Vec<(Uuid, SessionStatus)>,
    notes: Vec<NoteRecord>,
    tasks: Vec<TaskRecord>,
}

/// Vec-backed record store behind a mutex, cloneable so every repository
/// trait object shares the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore(Arc<Mutex<Shared>>);

impl InMemoryStore {
    fn guard(&self) -> MutexGuard<'_, Shared> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notes(&self) -> Vec<NoteRecord> {
        self.guard().notes.clone()
    }

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.guard().tasks.clone()
    }

    pub fn chunks(&self) -> Vec<Chunk> {
        let mut chunks = self.guard().chunks.clone();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.guard().candidates.clone()
    }

    pub fn labels(&self) -> Vec<RelevanceLabel> {
        self.guard().labels.clone()
    }

    pub fn subject_history(&self) -> Vec<SubjectHistoryEntry> {
        self.guard().history.clone()
    }

    pub fn session_status(&self, meeting_id: Uuid) -> Option<SessionStatus> {
        self.guard()
            .sessions
            .iter()
            .find(|(id, _)| *id == meeting_id)
            .map(|(_, status)| *status)
    }

    pub fn subject(&self, meeting_id: Uuid) -> Option<Subject> {
        self.guard()
            .subjects
            .iter()
            .find(|s| s.meeting_id == meeting_id)
            .cloned()
    }
}

impl SubjectRepo for InMemoryStore {
    fn upsert_draft(&mut self, subject: &Subject) -> Result<(), NoteError> {
        let mut shared = self.guard();
        if let Some(existing) = shared.subjects.iter_mut().find(|s| s.id == subject.id) {
            *existing = subject.clone();
        } else {
            shared.subjects.push(subject.clone());
        }
        Ok(())
    }

    fn lock(&mut self, subject: &Subject) -> Result<(), NoteError> {
        let mut shared = self.guard();
        if let Some(existing) = shared.subjects.iter_mut().find(|s| s.id == subject.id) {
            *existing = subject.clone();
            Ok(())
        } else {
            shared.subjects.push(subject.clone());
            Ok(())
        }
    }

    fn get_by_meeting(&self, meeting_id: Uuid) -> Result<Option<Subject>, NoteError> {
        Ok(self.subject(meeting_id))
    }
}

impl SubjectHistoryRepo for InMemoryStore {
    fn append(&mut self, entry: &SubjectHistoryEntry) -> Result<(), NoteError> {
        self.guard().history.push(entry.clone());
        Ok(())
    }

    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<SubjectHistoryEntry>, NoteError> {
        let mut rows: Vec<_> = self
            .guard()
            .history
            .iter()
            .filter(|h| h.meeting_id == meeting_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(rows)
    }
}

impl ChunkRepo for InMemoryStore {
    fn insert(&mut self, chunk: &Chunk) -> Result<(), NoteError> {
        self.guard().chunks.push(chunk.clone());
        Ok(())
    }

    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<Chunk>, NoteError> {
        let mut chunks: Vec<_> = self
            .guard()
            .chunks
            .iter()
            .filter(|c| c.meeting_id == meeting_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }
}

impl RelevanceLabelRepo for InMemoryStore {
    fn insert(&mut self, label: &RelevanceLabel) -> Result<(), NoteError> {
        self.guard().labels.push(label.clone());
        Ok(())
    }

    fn update_by_id(&mut self, label: &RelevanceLabel) -> Result<(), NoteError> {
        let mut shared = self.guard();
        match shared.labels.iter_mut().find(|l| l.id == label.id) {
            Some(existing) => {
                *existing = label.clone();
                Ok(())
            }
            None => Err(NoteError::Repository(format!("no relevance label {}", label.id))),
        }
    }

    fn get_by_chunk(&self, chunk_id: Uuid) -> Result<Vec<RelevanceLabel>, NoteError> {
        Ok(self
            .guard()
            .labels
            .iter()
            .filter(|l| l.chunk_id == chunk_id)
            .cloned()
            .collect())
    }

    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<RelevanceLabel>, NoteError> {
        Ok(self
            .guard()
            .labels
            .iter()
            .filter(|l| l.meeting_id == meeting_id)
            .cloned()
            .collect())
    }
}

impl CandidateRepo for InMemoryStore {
    fn insert(&mut self, candidate: &Candidate) -> Result<(), NoteError> {
        self.guard().candidates.push(candidate.clone());
        Ok(())
    }

    fn update_finalization_fields(&mut self, candidate: &Candidate) -> Result<(), NoteError> {
        let mut shared = self.guard();
        match shared.candidates.iter_mut().find(|c| c.id == candidate.id) {
            Some(existing) => {
                existing.is_final = candidate.is_final;
                existing.is_duplicate = candidate.is_duplicate;
                existing.included_in_output = candidate.included_in_output;
                existing.exclusion_reason = candidate.exclusion_reason.clone();
                existing.relevance_type = candidate.relevance_type;
                existing.relevance_score = candidate.relevance_score;
                existing.finalized_at = candidate.finalized_at;
                Ok(())
            }
            None => Err(NoteError::Repository(format!("no candidate {}", candidate.id))),
        }
    }

    fn list_by_meeting(&self, meeting_id: Uuid) -> Result<Vec<Candidate>, NoteError> {
        Ok(self
            .guard()
            .candidates
            .iter()
            .filter(|c| c.meeting_id == meeting_id)
            .cloned()
            .collect())
    }

    fn list_included(&self, meeting_id: Uuid) -> Result<Vec<Candidate>, NoteError> {
        Ok(self
            .guard()
            .candidates
            .iter()
            .filter(|c| c.meeting_id == meeting_id && c.included_in_output)
            .cloned()
            .collect())
    }
}

impl SessionRepo for InMemoryStore {
    fn insert(&mut self, meeting_id: Uuid, status: SessionStatus) -> Result<(), NoteError> {
        self.guard().sessions.push((meeting_id, status));
        Ok(())
    }

    fn update_status(&mut self, meeting_id: Uuid, status: SessionStatus) -> Result<(), NoteError> {
        let mut shared = self.guard();
        match shared.sessions.iter_mut().find(|(id, _)| *id == meeting_id) {
            Some(entry) => {
                entry.1 = status;
                Ok(())
            }
            None => Err(NoteError::Repository(format!("no session {meeting_id}"))),
        }
    }
}

impl NoteRepo for InMemoryStore {
    fn create(&mut self, note: &NoteRecord) -> Result<(), NoteError> {
        self.guard().notes.push(note.clone());
        Ok(())
    }
}

impl TaskRepo for InMemoryStore {
    fn create(&mut self, task: &TaskRecord) -> Result<(), NoteError> {
        self.guard().tasks.push(task.clone());
        Ok(())
    }
}

//! Subject-aware note generation session — chunking, live subject and
//! relevance estimation, candidate extraction, and end-of-meeting
//! finalization.
//!
//! ```text
//! segments → Chunker → (Subject Estimator, Relevance Classifier,
//!            Candidate Extractor) → candidate store → Finalizer
//!          → {Notes, Tasks, StructuredOutput, AuditTrail, Events}
//! ```
//!
//! The [`SessionController`] owns all in-memory session state and serializes
//! chunk processing; everything downstream of the LLM provider trait is
//! deterministic given the provider's responses.

pub mod chunker;
pub mod controller;
pub mod detector;
pub mod events;
pub mod extractor;
pub mod finalizer;
pub mod relevance;
pub mod repos;
pub mod similarity;
pub mod validator;

pub use controller::SessionController;
pub use events::{ConfidenceInfo, EventSink, NoteEvent};
pub use finalizer::FinalizationResult;
pub use repos::{
    CandidateRepo, ChunkRepo, InMemoryStore, NoteRepo, RelevanceLabelRepo, Repositories,
    SessionRepo, SubjectHistoryRepo, SubjectRepo, TaskRepo,
};

//! Session controller — owns the in-memory session state, serializes chunk
//! processing, drives the tick loop, and emits UI events.
//!
//! Concurrency model: cooperative single-writer. Exactly one task at a time
//! runs the chunk pipeline, guarded by the `is_processing` flag; the 5 s
//! ticker and the segment-ingestion path both funnel into the same
//! `maybe_process_chunk` entry point. The state mutex is never held across an
//! LLM call — suspension points read a snapshot and write back under a fresh
//! lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use recap_config::NotesConfig;
use recap_core::{
    Candidate, Chunk, NoteError, RelevanceLabel, RelevanceType, Segment, SessionStatus, Subject,
};
use recap_llm::ChatProvider;
use recap_subject::SubjectEstimator;

use crate::chunker::{ChunkLimits, Chunker};
use crate::detector;
use crate::events::{ConfidenceInfo, EventSink, NoteEvent};
use crate::extractor;
use crate::finalizer::{self, FinalizationResult};
use crate::relevance::{self, RelevanceAssessment};
use crate::repos::Repositories;

/// Tick period for the readiness check.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Poll period while waiting for an in-flight chunk to finish at stop.
const DRAIN_POLL: Duration = Duration::from_millis(25);

// ── Session state ─────────────────────────────────────────────────────────────

/// Everything the session exclusively owns. Released when the session ends.
pub(crate) struct SessionState {
    pub(crate) meeting_id: Uuid,
    pub(crate) config: NotesConfig,
    pub(crate) status: SessionStatus,
    pub(crate) chunker: Chunker,
    pub(crate) estimator: SubjectEstimator,
    pub(crate) repos: Repositories,
    pub(crate) is_processing: bool,
    pub(crate) chunks_processed: u32,
    pub(crate) last_batch_start: Option<DateTime<Utc>>,
    pub(crate) last_batch_complete: Option<DateTime<Utc>>,
}

impl SessionState {
    pub(crate) fn chunk_limits(&self) -> ChunkLimits {
        ChunkLimits {
            min_window_ms: self.config.min_chunk_window_ms,
            max_window_ms: self.config.max_chunk_window_ms,
            min_segments: self.config.min_segments_per_chunk,
            max_segments: self.config.max_segments_per_chunk,
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SessionController {
    pub(crate) meeting_id: Uuid,
    pub(crate) state: Arc<Mutex<SessionState>>,
    pub(crate) provider: Arc<dyn ChatProvider>,
    pub(crate) events: EventSink,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionController {
    pub fn new(
        meeting_id: Uuid,
        config: NotesConfig,
        provider: Arc<dyn ChatProvider>,
        repos: Repositories,
    ) -> Self {
        let estimator = SubjectEstimator::new(
            meeting_id,
            config.min_scope_keywords,
            config.max_scope_keywords,
            config.strictness_mode,
        );
        let state = SessionState {
            meeting_id,
            config,
            status: SessionStatus::Idle,
            chunker: Chunker::new(),
            estimator,
            repos,
            is_processing: false,
            chunks_processed: 0,
            last_batch_start: None,
            last_batch_complete: None,
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            meeting_id,
            state: Arc::new(Mutex::new(state)),
            provider,
            events: EventSink::default(),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn meeting_id(&self) -> Uuid {
        self.meeting_id
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<NoteEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.lock().await.status
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Start the session: verify provider health, register the session row,
    /// and spawn the tick loop. An unhealthy provider aborts the start.
    pub async fn start(&self) -> Result<(), NoteError> {
        {
            let st = self.state.lock().await;
            if st.status != SessionStatus::Idle {
                return Err(NoteError::SessionInactive(format!(
                    "start requested while {:?}",
                    st.status
                )));
            }
        }

        let health = self.provider.check_health(true).await;
        if !health.healthy {
            let reason = health.error.unwrap_or_else(|| "unknown".to_string());
            self.emit_error(&NoteError::LlmUnavailable(reason.clone()));
            return Err(NoteError::LlmUnavailable(reason));
        }

        {
            let mut st = self.state.lock().await;
            st.repos.sessions.insert(self.meeting_id, SessionStatus::Active)?;
            st.status = SessionStatus::Active;
        }
        self.emit_status(SessionStatus::Active);
        info!(meeting = %self.meeting_id, model = ?health.loaded_model, "session started");

        self.spawn_ticker();
        Ok(())
    }

    /// Buffer new segments and run the readiness check. Invalid segments are
    /// dropped with a warning; duplicate ids are ignored. Returns the number
    /// of segments accepted.
    pub async fn add_segments(&self, segments: Vec<Segment>) -> Result<usize, NoteError> {
        let mut accepted = 0usize;
        {
            let mut st = self.state.lock().await;
            match st.status {
                SessionStatus::Active | SessionStatus::Processing | SessionStatus::Paused => {}
                other => {
                    warn!(meeting = %self.meeting_id, status = ?other, "add_segments on inactive session");
                    return Ok(0);
                }
            }
            for segment in segments {
                if segment.id.trim().is_empty() || segment.start_ms > segment.end_ms {
                    warn!(id = %segment.id, "invalid segment dropped");
                    self.events.emit(NoteEvent::Error {
                        meeting_id: self.meeting_id,
                        code: "invalid_input".to_string(),
                        message: format!("segment {} failed validation", segment.id),
                        recoverable: true,
                        at_ms: Utc::now().timestamp_millis(),
                    });
                    continue;
                }
                if st.chunker.push(segment) {
                    accepted += 1;
                }
            }
        }
        self.maybe_process_chunk().await;
        Ok(accepted)
    }

    /// Stop starting new chunks. A chunk already executing completes.
    pub async fn pause(&self) {
        let changed = {
            let mut st = self.state.lock().await;
            match st.status {
                SessionStatus::Active | SessionStatus::Processing => {
                    st.status = SessionStatus::Paused;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit_status(SessionStatus::Paused);
        }
    }

    /// Resume a paused session. A no-op in any other state.
    pub async fn resume(&self) {
        let resumed_to = {
            let mut st = self.state.lock().await;
            if st.status != SessionStatus::Paused {
                None
            } else if st.is_processing {
                // In-flight chunk: it restores Processing→Active on exit.
                st.status = SessionStatus::Processing;
                Some(SessionStatus::Processing)
            } else {
                st.status = SessionStatus::Active;
                Some(SessionStatus::Active)
            }
        };
        if let Some(status) = resumed_to {
            self.emit_status(status);
            if status == SessionStatus::Active {
                self.maybe_process_chunk().await;
            }
        }
    }

    /// End the session: drain the in-flight chunk, then run the five
    /// finalization steps. Finalization errors are fatal to the session.
    pub async fn stop(&self) -> Result<FinalizationResult, NoteError> {
        {
            let st = self.state.lock().await;
            match st.status {
                SessionStatus::Active | SessionStatus::Processing | SessionStatus::Paused => {}
                other => {
                    warn!(meeting = %self.meeting_id, status = ?other, "stop on inactive session");
                    return Err(NoteError::SessionInactive(format!(
                        "stop requested while {other:?}"
                    )));
                }
            }
        }

        // Stop the ticker; no new chunks start after this point.
        let _ = self.shutdown.send(true);

        // No in-flight cancellation: wait for the current chunk to finish.
        loop {
            {
                let st = self.state.lock().await;
                if !st.is_processing {
                    break;
                }
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }

        {
            let mut st = self.state.lock().await;
            st.status = SessionStatus::Finalizing;
            if let Err(err) = st.repos.sessions.update_status(self.meeting_id, SessionStatus::Finalizing) {
                warn!(?err, "session status update failed");
            }
        }
        self.emit_status(SessionStatus::Finalizing);

        match finalizer::finalize(self).await {
            Ok(result) => {
                {
                    let mut st = self.state.lock().await;
                    st.status = SessionStatus::Completed;
                    if let Err(err) =
                        st.repos.sessions.update_status(self.meeting_id, SessionStatus::Completed)
                    {
                        warn!(?err, "session status update failed");
                    }
                }
                self.emit_status(SessionStatus::Completed);
                Ok(result)
            }
            Err(err) => {
                {
                    let mut st = self.state.lock().await;
                    st.status = SessionStatus::Error;
                    let _ = st.repos.sessions.update_status(self.meeting_id, SessionStatus::Error);
                }
                self.emit_error(&err);
                self.emit_status(SessionStatus::Error);
                Err(err)
            }
        }
    }

    // ── Tick loop ─────────────────────────────────────────────────────────

    fn spawn_ticker(&self) {
        let controller = self.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(TICK_INTERVAL) => {
                        controller.maybe_process_chunk().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(meeting = %controller.meeting_id, "ticker stopped");
        });
    }

    /// Readiness check and, when ready, one serialized chunk pass. Safe to
    /// call from any path; re-entry is impossible while a chunk is in flight.
    pub async fn maybe_process_chunk(&self) {
        let Some((chunk, draft)) = self.try_claim().await else {
            return;
        };
        self.emit_status(SessionStatus::Processing);
        self.emit_batch_state().await;

        let outcome = self.run_chunk(&chunk, draft).await;
        self.release(&chunk, outcome).await;
    }

    /// Claim the processing slot and select the next chunk, or back off.
    async fn try_claim(&self) -> Option<(Chunk, Option<Subject>)> {
        let now = Utc::now();
        let mut st = self.state.lock().await;
        if st.status != SessionStatus::Active || st.is_processing {
            return None;
        }
        if st.chunker.pending_count() < st.config.min_segments_per_chunk {
            return None;
        }
        if let Some(complete) = st.last_batch_complete {
            if (now - complete).num_milliseconds() < st.config.batch_interval_ms {
                return None;
            }
        }
        let selection = st.chunker.select(st.chunk_limits(), false)?;
        let chunk = st.chunker.build_chunk(self.meeting_id, &selection);

        st.is_processing = true;
        st.status = SessionStatus::Processing;
        st.last_batch_start = Some(now);
        Some((chunk, st.estimator.current_subject()))
    }

    /// Release the processing slot, committing on success.
    async fn release(&self, chunk: &Chunk, outcome: Result<(), NoteError>) {
        let restored = {
            let mut st = self.state.lock().await;
            st.is_processing = false;
            match &outcome {
                Ok(()) => {
                    st.chunker.commit(&chunk.segment_ids);
                    st.chunks_processed += 1;
                    st.last_batch_complete = Some(Utc::now());
                }
                Err(err) => {
                    // Segments stay pending for the next tick.
                    warn!(chunk = chunk.chunk_index, %err, "chunk processing failed");
                }
            }
            if st.status == SessionStatus::Processing {
                st.status = SessionStatus::Active;
                true
            } else {
                false
            }
        };
        if let Err(err) = &outcome {
            self.emit_error(err);
        }
        if restored {
            self.emit_status(SessionStatus::Active);
        }
        self.emit_batch_state().await;
    }

    // ── The per-chunk pipeline ────────────────────────────────────────────

    /// One chunk through the live pass. LLM results are gathered first; all
    /// repository writes happen together afterwards so a failed call leaves
    /// no partial records and the segments retry cleanly.
    pub(crate) async fn run_chunk(
        &self,
        chunk: &Chunk,
        draft: Option<Subject>,
    ) -> Result<(), NoteError> {
        let cfg = {
            let st = self.state.lock().await;
            st.config.clone()
        };
        let now = Utc::now();

        // Subject detection against the pre-chunk draft.
        let detection = detector::detect_subject(
            self.provider.as_ref(),
            chunk,
            draft.as_ref(),
            cfg.max_tokens,
            cfg.temperature,
            now,
        )
        .await?;

        // Fold into the weighted maps; the relevance call below sees the
        // updated subject.
        let (subject, history_entry, confidence) = {
            let mut st = self.state.lock().await;
            let entry = detection.and_then(|d| st.estimator.apply_detection(d, now));
            let info = ConfidenceInfo {
                score: st.estimator.confidence(),
                status: st.estimator.status(),
                message: st.estimator.status().message().to_string(),
                detection_count: st.estimator.detection_count(),
            };
            (st.estimator.current_subject(), entry, info)
        };

        // Relevance needs a subject; before the first detection there is
        // nothing to score against.
        let assessment: Option<RelevanceAssessment> = match &subject {
            Some(subject) => Some(
                relevance::classify_relevance(
                    self.provider.as_ref(),
                    subject,
                    &chunk.content,
                    cfg.strictness_mode,
                    cfg.max_tokens,
                    cfg.temperature,
                )
                .await?,
            ),
            None => None,
        };

        // Extraction is skipped only for clearly out-of-scope chunks.
        let extract = match &assessment {
            Some(a) => a.relevance_type != RelevanceType::OutOfScope,
            None => true,
        };
        let mut candidates: Vec<Candidate> = if extract {
            extractor::extract_candidates(
                self.provider.as_ref(),
                subject.as_ref(),
                chunk,
                cfg.llm_action_validation,
                cfg.max_tokens,
                cfg.temperature,
            )
            .await?
        } else {
            debug!(chunk = chunk.chunk_index, "out_of_scope chunk skipped by extractor");
            Vec::new()
        };
        if let Some(a) = &assessment {
            for candidate in &mut candidates {
                candidate.relevance_type = Some(a.relevance_type);
                candidate.relevance_score = Some(a.score);
            }
        }

        // All suspension points passed — write everything in order.
        let mut st = self.state.lock().await;
        st.repos.chunks.insert(chunk)?;

        if let Some(entry) = &history_entry {
            if cfg.store_debug_data {
                if let Err(err) = st.repos.subject_history.append(entry) {
                    warn!(?err, "subject history append failed");
                }
            }
        }
        if let Some(subject) = &subject {
            if let Err(err) = st.repos.subjects.upsert_draft(subject) {
                warn!(?err, "subject upsert failed");
            }
        }

        let label = assessment.as_ref().map(|a| RelevanceLabel {
            id: Uuid::new_v4(),
            meeting_id: self.meeting_id,
            chunk_id: chunk.id,
            relevance_type: a.relevance_type,
            score: a.score,
            reasoning: a.reasoning.clone(),
            is_final: false,
            created_at: now,
        });
        if let Some(label) = &label {
            if cfg.store_debug_data {
                if let Err(err) = st.repos.relevance.insert(label) {
                    warn!(?err, "relevance label insert failed");
                }
            }
        }
        for candidate in &candidates {
            if let Err(err) = st.repos.candidates.insert(candidate) {
                warn!(id = %candidate.id, ?err, "candidate insert failed");
            }
        }
        drop(st);

        // Events mirror the order the state changed in.
        let at_ms = Utc::now().timestamp_millis();
        if let Some(subject) = &subject {
            if history_entry.is_some() {
                self.events.emit(NoteEvent::Subject {
                    meeting_id: self.meeting_id,
                    subject: subject.clone(),
                    is_draft: true,
                    confidence: confidence.clone(),
                    at_ms,
                });
                self.events.emit(NoteEvent::Confidence {
                    meeting_id: self.meeting_id,
                    score: confidence.score,
                    status: confidence.status,
                    message: confidence.message.clone(),
                    detection_count: confidence.detection_count,
                    last_updated_ms: now.timestamp_millis(),
                    at_ms,
                });
            }
        }
        if let Some(label) = &label {
            self.events.emit(NoteEvent::Relevance {
                meeting_id: self.meeting_id,
                chunk_id: chunk.id,
                relevance_type: label.relevance_type,
                score: label.score,
                is_final: false,
                at_ms,
            });
        }
        self.events.emit(NoteEvent::Candidates {
            meeting_id: self.meeting_id,
            chunk_index: chunk.chunk_index,
            candidates,
            at_ms,
        });

        Ok(())
    }

    // ── Event helpers ─────────────────────────────────────────────────────

    pub(crate) fn emit_status(&self, status: SessionStatus) {
        self.events.emit(NoteEvent::Status {
            meeting_id: self.meeting_id,
            status,
            at_ms: Utc::now().timestamp_millis(),
        });
    }

    pub(crate) fn emit_error(&self, err: &NoteError) {
        self.events.emit(NoteEvent::Error {
            meeting_id: self.meeting_id,
            code: err.code().to_string(),
            message: err.to_string(),
            recoverable: err.recoverable(),
            at_ms: Utc::now().timestamp_millis(),
        });
    }

    pub(crate) async fn emit_batch_state(&self) {
        let st = self.state.lock().await;
        self.events.emit(NoteEvent::BatchState {
            meeting_id: self.meeting_id,
            is_processing: st.is_processing,
            pending_segment_count: st.chunker.pending_count(),
            chunks_processed: st.chunks_processed,
            last_batch_start_ms: st.last_batch_start.map(|t| t.timestamp_millis()),
            last_batch_complete_ms: st.last_batch_complete.map(|t| t.timestamp_millis()),
            at_ms: Utc::now().timestamp_millis(),
        });
    }
}

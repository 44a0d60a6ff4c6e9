//! End-of-meeting finalization.
//!
//! Five ordered steps: flush the remaining segments, lock the subject,
//! re-score every chunk against the locked subject, filter and deduplicate
//! candidates under the strictness mode, and persist the surviving notes and
//! tasks. Each step guards its own failures — a degraded re-check never
//! blocks candidate finalization, and per-record persistence errors are
//! counted rather than fatal.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use recap_core::{
    AuditTotals, AuditTrail, Candidate, NoteError, NoteKind, NoteRecord, NoteType, Priority,
    RelevanceChange, RelevanceLabel, RelevanceType, StrictnessMode, StructuredOutput, Subject,
    TaskRecord, TaskStatus,
};

use crate::controller::SessionController;
use crate::events::NoteEvent;
use crate::relevance;
use crate::similarity;

/// What a successful finalization hands back to the caller.
#[derive(Debug, Clone)]
pub struct FinalizationResult {
    pub output: StructuredOutput,
    pub audit: AuditTrail,
    pub notes_count: usize,
    pub tasks_count: usize,
    pub filtered_count: usize,
}

pub(crate) async fn finalize(
    controller: &SessionController,
) -> Result<FinalizationResult, NoteError> {
    let meeting_id = controller.meeting_id;

    // Step 1 — flush any remaining segments as a final chunk.
    flush_remainder(controller).await;

    // Step 2 — lock the subject.
    let locked_subject = {
        let mut st = controller.state.lock().await;
        let locked = st.estimator.lock(Utc::now());
        if let Some(subject) = &locked {
            if let Err(err) = st.repos.subjects.lock(subject) {
                warn!(?err, "persisting locked subject failed");
            }
        }
        locked
    };
    if let Some(subject) = &locked_subject {
        info!(meeting = %meeting_id, title = %subject.title, "subject locked");
    }

    // Step 3 — re-score every chunk against the locked subject.
    let relevance_changes = recheck_relevance(controller, locked_subject.as_ref()).await;

    // Steps 4 and 5 — filter, deduplicate, persist, synthesize.
    finalize_candidates(controller, locked_subject, relevance_changes).await
}

// ── Step 1: flush ─────────────────────────────────────────────────────────────

/// Process leftover segments with relaxed window constraints. If the live
/// pipeline fails on them, the bare chunk is still stored so the final
/// relevance re-check covers its content.
async fn flush_remainder(controller: &SessionController) {
    let claim = {
        let st = controller.state.lock().await;
        if st.chunker.pending_count() == 0 {
            None
        } else {
            let selection = st.chunker.select(st.chunk_limits(), true);
            selection.map(|sel| {
                let chunk = st.chunker.build_chunk(controller.meeting_id, &sel);
                (chunk, st.estimator.current_subject())
            })
        }
    };
    let Some((chunk, draft)) = claim else {
        return;
    };

    debug!(chunk = chunk.chunk_index, segments = chunk.segment_ids.len(), "flushing remainder");
    let outcome = controller.run_chunk(&chunk, draft).await;

    let mut st = controller.state.lock().await;
    if let Err(err) = &outcome {
        warn!(%err, "flush chunk degraded; storing bare chunk");
        controller.emit_error(err);
        if let Err(err) = st.repos.chunks.insert(&chunk) {
            warn!(?err, "bare flush chunk insert failed");
            return;
        }
    }
    st.chunker.commit(&chunk.segment_ids);
    st.chunks_processed += 1;
    st.last_batch_complete = Some(Utc::now());
}

// ── Step 3: final relevance re-check ──────────────────────────────────────────

async fn recheck_relevance(
    controller: &SessionController,
    subject: Option<&Subject>,
) -> Vec<RelevanceChange> {
    let Some(subject) = subject else {
        // No subject was ever detected; nothing to score against.
        return Vec::new();
    };

    let (chunks, cfg) = {
        let st = controller.state.lock().await;
        let chunks = match st.repos.chunks.list_by_meeting(controller.meeting_id) {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(?err, "chunk listing failed; skipping relevance re-check");
                return Vec::new();
            }
        };
        (chunks, st.config.clone())
    };

    let mut changes = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let assessment = match relevance::classify_relevance(
            controller.provider.as_ref(),
            subject,
            &chunk.content,
            cfg.strictness_mode,
            cfg.max_tokens,
            cfg.temperature,
        )
        .await
        {
            Ok(assessment) => assessment,
            Err(err) => {
                // Draft label stays in place, unmarked; candidates from this
                // chunk finalize conservatively.
                warn!(chunk = chunk.chunk_index, %err, "final relevance re-check failed");
                controller.emit_error(&err);
                continue;
            }
        };

        let mut st = controller.state.lock().await;
        let existing = st.repos.relevance.get_by_chunk(chunk.id).unwrap_or_default();
        let draft = existing.iter().find(|l| !l.is_final);
        let prior_final = existing.iter().find(|l| l.is_final);

        let label = RelevanceLabel {
            id: prior_final.map(|l| l.id).unwrap_or_else(Uuid::new_v4),
            meeting_id: controller.meeting_id,
            chunk_id: chunk.id,
            relevance_type: assessment.relevance_type,
            score: assessment.score,
            reasoning: assessment.reasoning.clone(),
            is_final: true,
            created_at: Utc::now(),
        };
        let persisted = if prior_final.is_some() {
            st.repos.relevance.update_by_id(&label)
        } else {
            st.repos.relevance.insert(&label)
        };
        if let Err(err) = persisted {
            warn!(chunk = chunk.chunk_index, ?err, "final label persist failed");
        }

        changes.push(RelevanceChange {
            chunk_id: chunk.id,
            draft_relevance: draft.map(|l| l.relevance_type),
            final_relevance: assessment.relevance_type,
            draft_score: draft.map(|l| l.score),
            final_score: assessment.score,
        });
        drop(st);

        controller.events.emit(NoteEvent::Relevance {
            meeting_id: controller.meeting_id,
            chunk_id: chunk.id,
            relevance_type: assessment.relevance_type,
            score: assessment.score,
            is_final: true,
            at_ms: Utc::now().timestamp_millis(),
        });
    }
    changes
}

// ── Strictness filter ─────────────────────────────────────────────────────────

/// Returns `None` to include, or the exclusion reason code. Threshold
/// comparisons are `≥` — a score exactly at the bar is kept.
fn strictness_verdict(
    mode: StrictnessMode,
    relevance: RelevanceType,
    score: f32,
) -> Option<String> {
    let reason = |code: &str| Some(format!("{code}_{}", mode.as_str()));
    match relevance {
        RelevanceType::OutOfScope => reason("out_of_scope"),
        RelevanceType::InScopeImportant => None,
        RelevanceType::InScopeMinor => match mode {
            StrictnessMode::Strict => reason("in_scope_minor"),
            StrictnessMode::Balanced if score >= 0.3 => None,
            StrictnessMode::Balanced => reason("low_score"),
            StrictnessMode::Loose if score >= 0.2 => None,
            StrictnessMode::Loose => reason("low_score"),
        },
        RelevanceType::Unclear => match mode {
            StrictnessMode::Strict => reason("unclear"),
            StrictnessMode::Balanced => reason("unclear"),
            StrictnessMode::Loose if score >= 0.4 => None,
            StrictnessMode::Loose => reason("low_score"),
        },
    }
}

// ── Steps 4 + 5: candidate finalization and persistence ───────────────────────

async fn finalize_candidates(
    controller: &SessionController,
    locked_subject: Option<Subject>,
    relevance_changes: Vec<RelevanceChange>,
) -> Result<FinalizationResult, NoteError> {
    let meeting_id = controller.meeting_id;
    let finalized_at = Utc::now();

    let mut st = controller.state.lock().await;
    let strictness = st.config.strictness_mode;

    let all_candidates = st
        .repos
        .candidates
        .list_by_meeting(meeting_id)
        .map_err(|err| NoteError::Finalization { step: "candidates", message: err.to_string() })?;
    let final_labels: HashMap<Uuid, (RelevanceType, f32)> = st
        .repos
        .relevance
        .list_by_meeting(meeting_id)
        .map_err(|err| NoteError::Finalization { step: "labels", message: err.to_string() })?
        .into_iter()
        .filter(|label| label.is_final)
        .map(|label| (label.chunk_id, (label.relevance_type, label.score)))
        .collect();

    let mut included: Vec<Candidate> = Vec::new();
    let mut filtered: Vec<Candidate> = Vec::new();
    let mut duplicates = 0usize;
    let mut persistence_errors = 0usize;

    for mut candidate in all_candidates {
        candidate.is_final = true;
        candidate.finalized_at = Some(finalized_at);

        // Global near-duplicate check against already-accepted candidates.
        if similarity::is_near_duplicate(
            &candidate.content,
            included.iter().map(|c| c.content.as_str()),
        ) {
            candidate.is_duplicate = true;
            candidate.included_in_output = false;
            candidate.exclusion_reason = Some("duplicate".to_string());
            duplicates += 1;
            if let Err(err) = st.repos.candidates.update_finalization_fields(&candidate) {
                warn!(id = %candidate.id, ?err, "candidate finalization persist failed");
                persistence_errors += 1;
            }
            filtered.push(candidate);
            continue;
        }

        // Strictness filter over the chunk's final relevance. A chunk with
        // no final label (re-check failed) is treated as relevance-unknown
        // and kept.
        let verdict = match candidate.chunk_id.and_then(|id| final_labels.get(&id)) {
            Some((relevance, score)) => {
                candidate.relevance_type = Some(*relevance);
                candidate.relevance_score = Some(*score);
                strictness_verdict(strictness, *relevance, *score)
            }
            None => None,
        };

        match verdict {
            None => {
                candidate.included_in_output = true;
                candidate.exclusion_reason = None;
            }
            Some(reason) => {
                candidate.included_in_output = false;
                candidate.exclusion_reason = Some(reason);
            }
        }
        if let Err(err) = st.repos.candidates.update_finalization_fields(&candidate) {
            warn!(id = %candidate.id, ?err, "candidate finalization persist failed");
            persistence_errors += 1;
            candidate.included_in_output = false;
            candidate.exclusion_reason = Some("persistence_error".to_string());
            filtered.push(candidate);
            continue;
        }
        if candidate.included_in_output {
            included.push(candidate);
        } else {
            filtered.push(candidate);
        }
    }

    // Step 5 — persist notes and tasks for the included candidates, then
    // build the structured output from what actually persisted.
    let mut output = StructuredOutput { subject: locked_subject.clone(), ..Default::default() };
    let mut surviving: Vec<Candidate> = Vec::new();
    let mut notes_count = 0usize;
    let mut tasks_count = 0usize;

    for candidate in included {
        let note = note_record_for(&candidate, finalized_at);
        if let Err(err) = st.repos.notes.create(&note) {
            warn!(id = %candidate.id, ?err, "note persist failed; candidate omitted");
            persistence_errors += 1;
            let mut dropped = candidate;
            dropped.included_in_output = false;
            dropped.exclusion_reason = Some("persistence_error".to_string());
            if let Err(err) = st.repos.candidates.update_finalization_fields(&dropped) {
                warn!(id = %dropped.id, ?err, "candidate rollback persist failed");
            }
            filtered.push(dropped);
            continue;
        }
        notes_count += 1;

        if matches!(candidate.note_type, NoteType::ActionItem | NoteType::Task) {
            let task = TaskRecord {
                id: Uuid::new_v4(),
                meeting_id,
                title: candidate.content.clone(),
                description: None,
                assignee: candidate.assignee.clone(),
                due_date: candidate.deadline.clone(),
                priority: candidate.priority.unwrap_or(Priority::Medium),
                status: TaskStatus::Pending,
                created_at: finalized_at,
            };
            match st.repos.tasks.create(&task) {
                Ok(()) => tasks_count += 1,
                Err(err) => {
                    warn!(id = %candidate.id, ?err, "task persist failed");
                    persistence_errors += 1;
                }
            }
        }

        let bucket = match candidate.note_type {
            NoteType::KeyPoint => &mut output.key_points,
            NoteType::Decision => &mut output.decisions,
            NoteType::ActionItem => &mut output.action_items,
            NoteType::Task => &mut output.tasks,
            NoteType::OtherNote => &mut output.other_notes,
        };
        bucket.push((&candidate).into());
        surviving.push(candidate);
    }
    drop(st);

    let totals = AuditTotals {
        candidates: surviving.len() + filtered.len(),
        included: surviving.len(),
        filtered: filtered.len(),
        duplicates,
        notes_created: notes_count,
        tasks_created: tasks_count,
        persistence_errors,
    };
    let audit = AuditTrail {
        session_id: meeting_id,
        locked_subject,
        draft_subject_history: {
            let st = controller.state.lock().await;
            st.estimator.history().to_vec()
        },
        relevance_changes,
        filtered_candidates: filtered,
        included_candidates: surviving,
        totals,
        finalized_at,
        strictness_mode: strictness,
    };

    info!(
        meeting = %meeting_id,
        included = totals.included,
        filtered = totals.filtered,
        duplicates = totals.duplicates,
        notes = notes_count,
        tasks = tasks_count,
        errors = persistence_errors,
        "finalization complete"
    );

    let at_ms = Utc::now().timestamp_millis();
    controller.events.emit(NoteEvent::Persisted {
        meeting_id,
        notes_count,
        tasks_count,
        at_ms,
    });
    controller.events.emit(NoteEvent::FinalizationComplete {
        meeting_id,
        notes_count,
        tasks_count,
        filtered_count: totals.filtered,
        final_output: output.clone(),
        audit_trail: audit.clone(),
        at_ms,
    });

    Ok(FinalizationResult {
        output,
        audit,
        notes_count,
        tasks_count,
        filtered_count: totals.filtered,
    })
}

/// Map a candidate onto its persisted note record. Action items with both an
/// owner and a deadline get the `[Owner] Task — Due: Date` rendering.
fn note_record_for(candidate: &Candidate, created_at: chrono::DateTime<Utc>) -> NoteRecord {
    let note_kind = match candidate.note_type {
        NoteType::KeyPoint => NoteKind::KeyPoint,
        NoteType::Decision => NoteKind::Decision,
        NoteType::ActionItem | NoteType::Task => NoteKind::ActionItem,
        NoteType::OtherNote => NoteKind::Custom,
    };
    let content = match (&candidate.note_type, &candidate.assignee, &candidate.deadline) {
        (NoteType::ActionItem, Some(assignee), Some(deadline)) => {
            format!("[{assignee}] {} — Due: {deadline}", candidate.content)
        }
        _ => candidate.content.clone(),
    };
    NoteRecord {
        id: Uuid::new_v4(),
        meeting_id: candidate.meeting_id,
        content,
        note_kind,
        is_ai_generated: true,
        source_segment_ids: candidate.source_segment_ids.clone(),
        context: None,
        confidence: candidate.relevance_score,
        speaker_id: candidate.speaker_id.clone(),
        created_at,
    }
}

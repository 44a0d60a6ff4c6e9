use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use recap_core::{StrictnessMode, Subject, SubjectHistoryEntry, SubjectStatus};

use crate::stability::{self, ConfidenceStatus};

/// Half-life of a detection's weight.
const HALF_LIFE_MS: f64 = 120_000.0;

/// Evidence weight for a detection of the given age.
///
/// `exp(-ln2 · age / halfLife)`, clamped to `[0.1, 1.0]` — a detection made
/// right now weighs ~1.0, one half-life ago ~0.5, and old evidence never
/// decays below the floor.
pub fn decay_weight(age_ms: i64) -> f64 {
    let age = age_ms.max(0) as f64;
    (-(std::f64::consts::LN_2) * age / HALF_LIFE_MS).exp().clamp(0.1, 1.0)
}

/// One accumulating entry in the title/goal/keyword maps.
#[derive(Debug, Clone)]
pub struct WeightedComponent {
    /// Original-case value from the first observation.
    pub value: String,
    pub cumulative_weight: f64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub occurrence_count: u32,
}

impl WeightedComponent {
    fn new(value: String, weight: f64, at: DateTime<Utc>) -> Self {
        Self {
            value,
            cumulative_weight: weight,
            first_seen_at: at,
            last_seen_at: at,
            occurrence_count: 1,
        }
    }

    fn accumulate(&mut self, weight: f64, at: DateTime<Utc>) {
        self.cumulative_weight += weight;
        self.occurrence_count += 1;
        self.last_seen_at = at;
    }
}

/// A successful subject detection as coerced from the model.
#[derive(Debug, Clone)]
pub struct SubjectDetection {
    pub title: String,
    pub goal: String,
    pub keywords: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub chunk_window_start_ms: i64,
    pub chunk_window_end_ms: i64,
}

/// Session-scoped subject estimator.
///
/// Owned by the session controller; all maps and history are discarded with
/// the session. Once [`SubjectEstimator::lock`] has run, further detections
/// are rejected.
#[derive(Debug)]
pub struct SubjectEstimator {
    meeting_id: Uuid,
    subject_id: Uuid,
    min_scope_keywords: usize,
    max_scope_keywords: usize,
    strictness_mode: StrictnessMode,
    titles: HashMap<String, WeightedComponent>,
    goals: HashMap<String, WeightedComponent>,
    keywords: HashMap<String, WeightedComponent>,
    history: Vec<SubjectHistoryEntry>,
    locked: Option<Subject>,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl SubjectEstimator {
    pub fn new(
        meeting_id: Uuid,
        min_scope_keywords: usize,
        max_scope_keywords: usize,
        strictness_mode: StrictnessMode,
    ) -> Self {
        Self {
            meeting_id,
            subject_id: Uuid::new_v4(),
            min_scope_keywords,
            max_scope_keywords,
            strictness_mode,
            titles: HashMap::new(),
            goals: HashMap::new(),
            keywords: HashMap::new(),
            history: Vec::new(),
            locked: None,
        }
    }

    /// Fold one detection into the weighted maps.
    ///
    /// Detections carrying fewer than the minimum keyword count are ignored,
    /// as are all detections after the subject has been locked. Returns the
    /// appended history row on success.
    pub fn apply_detection(
        &mut self,
        detection: SubjectDetection,
        now: DateTime<Utc>,
    ) -> Option<SubjectHistoryEntry> {
        if self.locked.is_some() {
            warn!(meeting = %self.meeting_id, "subject update rejected: locked");
            return None;
        }
        if detection.title.trim().is_empty() || detection.keywords.len() < self.min_scope_keywords {
            debug!(
                keywords = detection.keywords.len(),
                required = self.min_scope_keywords,
                "subject detection skipped"
            );
            return None;
        }

        let age_ms = (now - detection.detected_at).num_milliseconds();
        let weight = decay_weight(age_ms);
        let at = detection.detected_at;

        accumulate_into(&mut self.titles, &detection.title, weight, at);
        accumulate_into(&mut self.goals, &detection.goal, weight, at);
        for keyword in &detection.keywords {
            if keyword.trim().is_empty() {
                continue;
            }
            accumulate_into(&mut self.keywords, keyword, weight, at);
        }

        let entry = SubjectHistoryEntry {
            id: Uuid::new_v4(),
            meeting_id: self.meeting_id,
            title: detection.title,
            goal: detection.goal,
            keywords: detection.keywords,
            confidence: 0.0,
            detected_at: detection.detected_at,
            chunk_window_start_ms: detection.chunk_window_start_ms,
            chunk_window_end_ms: detection.chunk_window_end_ms,
        };
        self.history.push(entry);

        // Stability is a function of the whole history including this row.
        let confidence = self.confidence();
        let entry = self.history.last_mut().map(|last| {
            last.confidence = confidence;
            last.clone()
        });

        debug!(
            weight,
            confidence,
            detections = self.history.len(),
            "subject detection applied"
        );
        entry
    }

    /// The current best subject, or `None` before any accepted detection.
    pub fn current_subject(&self) -> Option<Subject> {
        if let Some(locked) = &self.locked {
            return Some(locked.clone());
        }
        let title = best_component(&self.titles)?;
        let goal = best_component(&self.goals)
            .map(|g| g.value.clone())
            .unwrap_or_default();
        Some(Subject {
            id: self.subject_id,
            meeting_id: self.meeting_id,
            title: title.value.clone(),
            goal,
            scope_keywords: self.top_keywords(),
            status: SubjectStatus::Draft,
            strictness_mode: self.strictness_mode,
            confidence_score: self.confidence(),
            locked_at: None,
        })
    }

    /// Top keywords by cumulative weight, original case, capped at the
    /// configured maximum.
    fn top_keywords(&self) -> Vec<String> {
        let mut entries: Vec<&WeightedComponent> = self.keywords.values().collect();
        entries.sort_by(|a, b| {
            b.cumulative_weight
                .total_cmp(&a.cumulative_weight)
                .then_with(|| a.first_seen_at.cmp(&b.first_seen_at))
        });
        entries
            .into_iter()
            .take(self.max_scope_keywords)
            .map(|c| c.value.clone())
            .collect()
    }

    pub fn confidence(&self) -> f32 {
        stability::stability_score(&self.history)
    }

    pub fn status(&self) -> ConfidenceStatus {
        ConfidenceStatus::from_score(self.confidence())
    }

    pub fn detection_count(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[SubjectHistoryEntry] {
        &self.history
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    /// Freeze the current best subject. Exactly once per session; subsequent
    /// detections are rejected. Returns `None` when no subject was ever
    /// detected.
    pub fn lock(&mut self, now: DateTime<Utc>) -> Option<Subject> {
        if let Some(locked) = &self.locked {
            return Some(locked.clone());
        }
        let mut subject = self.current_subject()?;
        subject.status = SubjectStatus::Locked;
        subject.locked_at = Some(now);
        self.locked = Some(subject.clone());
        debug!(meeting = %self.meeting_id, title = %subject.title, "subject locked");
        Some(subject)
    }
}

fn accumulate_into(
    map: &mut HashMap<String, WeightedComponent>,
    raw: &str,
    weight: f64,
    at: DateTime<Utc>,
) {
    let key = normalize(raw);
    if key.is_empty() {
        return;
    }
    map.entry(key)
        .and_modify(|component| component.accumulate(weight, at))
        .or_insert_with(|| WeightedComponent::new(raw.trim().to_string(), weight, at));
}

fn best_component(map: &HashMap<String, WeightedComponent>) -> Option<&WeightedComponent> {
    map.values().max_by(|a, b| {
        a.cumulative_weight
            .total_cmp(&b.cumulative_weight)
            .then_with(|| b.first_seen_at.cmp(&a.first_seen_at))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn detection(title: &str, goal: &str, keywords: &[&str], at: DateTime<Utc>) -> SubjectDetection {
        SubjectDetection {
            title: title.to_string(),
            goal: goal.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            detected_at: at,
            chunk_window_start_ms: 0,
            chunk_window_end_ms: 30_000,
        }
    }

    fn estimator() -> SubjectEstimator {
        SubjectEstimator::new(Uuid::new_v4(), 5, 15, StrictnessMode::Strict)
    }

    const KW: &[&str] = &["budget", "q4", "forecast", "headcount", "runway"];

    // ── decay weight ───────────────────────────────────────────────────────

    #[test]
    fn decay_weight_is_one_for_fresh_detection() {
        assert!((decay_weight(0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn decay_weight_halves_after_one_half_life() {
        assert!((decay_weight(120_000) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn decay_weight_floors_at_one_tenth() {
        assert_eq!(decay_weight(i64::MAX / 2), 0.1);
        // Negative age (clock skew) clamps to the fresh weight, not above.
        assert!((decay_weight(-5_000) - 1.0).abs() < 1e-9);
    }

    // ── detection handling ─────────────────────────────────────────────────

    #[test]
    fn too_few_keywords_is_ignored() {
        let mut est = estimator();
        let now = Utc::now();
        let result = est.apply_detection(detection("Budget", "plan", &["a", "b"], now), now);
        assert!(result.is_none());
        assert!(est.current_subject().is_none());
        assert_eq!(est.detection_count(), 0);
    }

    #[test]
    fn first_detection_creates_draft_subject() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("Q4 Budget", "Plan spend", KW, now), now)
            .unwrap();

        let subject = est.current_subject().unwrap();
        assert_eq!(subject.title, "Q4 Budget");
        assert_eq!(subject.goal, "Plan spend");
        assert_eq!(subject.status, SubjectStatus::Draft);
        assert!(subject.scope_keywords.contains(&"budget".to_string()));
    }

    #[test]
    fn heavier_title_wins() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("Hiring pipeline", "hire", KW, now), now);
        est.apply_detection(detection("Hiring pipeline Q1", "hire", KW, now), now);
        est.apply_detection(detection("Hiring pipeline Q1", "hire", KW, now), now);

        assert_eq!(est.current_subject().unwrap().title, "Hiring pipeline Q1");
    }

    #[test]
    fn title_matching_is_case_insensitive_but_preserves_first_case() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("Q4 Budget", "g", KW, now), now);
        est.apply_detection(detection("q4 budget", "g", KW, now), now);
        est.apply_detection(detection("Other Topic", "g", KW, now), now);

        // Both spellings accumulate into one component, original case kept.
        assert_eq!(est.current_subject().unwrap().title, "Q4 Budget");
    }

    #[test]
    fn stale_detection_carries_less_weight() {
        let mut est = estimator();
        let now = Utc::now();
        // Two old detections of one title vs one fresh detection of another:
        // 2 × 0.1 (floored) < 1.0, so the fresh title wins.
        let long_ago = now - Duration::milliseconds(10_000_000);
        est.apply_detection(detection("Old Topic", "g", KW, long_ago), now);
        est.apply_detection(detection("Old Topic", "g", KW, long_ago), now);
        est.apply_detection(detection("Fresh Topic", "g", KW, now), now);

        assert_eq!(est.current_subject().unwrap().title, "Fresh Topic");
    }

    #[test]
    fn cumulative_weight_is_monotonic() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("T", "g", KW, now), now);
        let w1 = est.titles[&normalize("T")].cumulative_weight;
        est.apply_detection(detection("T", "g", KW, now), now);
        let w2 = est.titles[&normalize("T")].cumulative_weight;
        assert!(w2 > w1);
    }

    #[test]
    fn keywords_are_capped_at_max() {
        let mut est = SubjectEstimator::new(Uuid::new_v4(), 5, 6, StrictnessMode::Strict);
        let now = Utc::now();
        let many: Vec<String> = (0..10).map(|i| format!("kw{i}")).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        est.apply_detection(detection("T", "g", &refs, now), now);

        assert_eq!(est.current_subject().unwrap().scope_keywords.len(), 6);
    }

    // ── history ────────────────────────────────────────────────────────────

    #[test]
    fn history_appends_per_accepted_detection() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("T", "g", KW, now), now);
        est.apply_detection(detection("T", "g", &["x"], now), now); // skipped
        est.apply_detection(detection("T", "g", KW, now), now);
        assert_eq!(est.history().len(), 2);
    }

    // ── locking ────────────────────────────────────────────────────────────

    #[test]
    fn lock_freezes_subject_and_rejects_updates() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("T", "g", KW, now), now);

        let locked = est.lock(now).unwrap();
        assert_eq!(locked.status, SubjectStatus::Locked);
        assert_eq!(locked.locked_at, Some(now));

        assert!(
            est.apply_detection(detection("Other", "g", KW, now), now)
                .is_none()
        );
        assert_eq!(est.current_subject().unwrap().title, "T");
    }

    #[test]
    fn lock_is_idempotent() {
        let mut est = estimator();
        let now = Utc::now();
        est.apply_detection(detection("T", "g", KW, now), now);
        let first = est.lock(now).unwrap();
        let second = est.lock(now + Duration::seconds(5)).unwrap();
        assert_eq!(first.locked_at, second.locked_at);
    }

    #[test]
    fn lock_without_detections_yields_none() {
        let mut est = estimator();
        assert!(est.lock(Utc::now()).is_none());
    }
}

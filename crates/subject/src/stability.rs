//! Stability scoring over the subject detection history.
//!
//! Confidence is driven by agreement across detections, not recency — the
//! decay weighting in the estimator handles recency. Weights sum to 1.0:
//!
//! ```text
//! score = titleConsistency(0.30) + goalConsistency(0.25)
//!       + keywordStability(0.25) + detectionBonus(0.20)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use recap_core::SubjectHistoryEntry;

/// Confidence with fewer than two detections.
const BASELINE: f32 = 0.3;

/// Discrete stability bucket derived from the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceStatus {
    Unstable,
    Emerging,
    LikelyStable,
    Stable,
}

impl ConfidenceStatus {
    pub fn from_score(score: f32) -> Self {
        if score < 0.4 {
            Self::Unstable
        } else if score < 0.6 {
            Self::Emerging
        } else if score < 0.85 {
            Self::LikelyStable
        } else {
            Self::Stable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unstable => "unstable",
            Self::Emerging => "emerging",
            Self::LikelyStable => "likely_stable",
            Self::Stable => "stable",
        }
    }

    /// Human-readable summary for event payloads.
    pub fn message(self) -> &'static str {
        match self {
            Self::Unstable => "subject is still forming; expect the title to change",
            Self::Emerging => "a subject is emerging but has not settled",
            Self::LikelyStable => "subject is likely stable; minor wording may shift",
            Self::Stable => "subject is stable across detections",
        }
    }
}

/// Stability of the detection history, clamped to `[0, 1]`.
pub fn stability_score(history: &[SubjectHistoryEntry]) -> f32 {
    if history.len() < 2 {
        return BASELINE;
    }

    let title_consistency = modal_fraction(history.iter().map(|h| normalize(&h.title)));
    let goal_consistency = modal_fraction(history.iter().map(|h| normalize(&h.goal)));
    let keyword_stability = recurring_keyword_fraction(history);
    let detection_bonus = (history.len() as f32 / 5.0).min(1.0);

    let score = title_consistency * 0.30
        + goal_consistency * 0.25
        + keyword_stability * 0.25
        + detection_bonus * 0.20;

    score.clamp(0.0, 1.0)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Fraction of items agreeing with the most common value.
fn modal_fraction(values: impl Iterator<Item = String>) -> f32 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut total = 0usize;
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let modal = counts.values().copied().max().unwrap_or(0);
    modal as f32 / total as f32
}

/// Fraction of unique normalized keywords seen in more than one detection.
fn recurring_keyword_fraction(history: &[SubjectHistoryEntry]) -> f32 {
    let mut seen_in: HashMap<String, usize> = HashMap::new();
    for entry in history {
        let mut per_detection: Vec<String> = entry.keywords.iter().map(|k| normalize(k)).collect();
        per_detection.sort();
        per_detection.dedup();
        for keyword in per_detection {
            *seen_in.entry(keyword).or_insert(0) += 1;
        }
    }
    if seen_in.is_empty() {
        return 0.0;
    }
    let recurring = seen_in.values().filter(|&&count| count > 1).count();
    recurring as f32 / seen_in.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(title: &str, goal: &str, keywords: &[&str]) -> SubjectHistoryEntry {
        SubjectHistoryEntry {
            id: Uuid::new_v4(),
            meeting_id: Uuid::nil(),
            title: title.to_string(),
            goal: goal.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            confidence: 0.0,
            detected_at: Utc::now(),
            chunk_window_start_ms: 0,
            chunk_window_end_ms: 0,
        }
    }

    #[test]
    fn fewer_than_two_detections_is_baseline() {
        assert_eq!(stability_score(&[]), BASELINE);
        assert_eq!(stability_score(&[entry("t", "g", &["a"])]), BASELINE);
    }

    #[test]
    fn perfect_agreement_scores_high() {
        let history: Vec<_> = (0..5)
            .map(|_| entry("Q4 Budget", "plan spend", &["budget", "q4", "forecast"]))
            .collect();
        let score = stability_score(&history);
        // All four factors at 1.0 → 0.30 + 0.25 + 0.25 + 0.20 = 1.0.
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disagreement_lowers_score() {
        let agreed: Vec<_> = (0..4).map(|_| entry("A", "g", &["x", "y"])).collect();
        let mut split = agreed.clone();
        split[0] = entry("B", "other", &["p", "q"]);
        assert!(stability_score(&split) < stability_score(&agreed));
    }

    #[test]
    fn detection_bonus_saturates_at_five() {
        let five: Vec<_> = (0..5).map(|_| entry("A", "g", &["x"])).collect();
        let ten: Vec<_> = (0..10).map(|_| entry("A", "g", &["x"])).collect();
        assert!((stability_score(&five) - stability_score(&ten)).abs() < 1e-6);
    }

    #[test]
    fn keyword_stability_counts_recurring_only() {
        // "x" recurs; "solo1"/"solo2" appear once each → 1 of 3 recurring.
        let history = vec![entry("A", "g", &["x", "solo1"]), entry("A", "g", &["x", "solo2"])];
        let score = stability_score(&history);
        let expected = 1.0 * 0.30 + 1.0 * 0.25 + (1.0 / 3.0) * 0.25 + (2.0 / 5.0) * 0.20;
        assert!((score - expected).abs() < 1e-6);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(ConfidenceStatus::from_score(0.39), ConfidenceStatus::Unstable);
        assert_eq!(ConfidenceStatus::from_score(0.4), ConfidenceStatus::Emerging);
        assert_eq!(ConfidenceStatus::from_score(0.6), ConfidenceStatus::LikelyStable);
        assert_eq!(ConfidenceStatus::from_score(0.85), ConfidenceStatus::Stable);
        assert_eq!(ConfidenceStatus::from_score(1.0), ConfidenceStatus::Stable);
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let history = vec![entry("A", "", &[]), entry("B", "", &[])];
        let score = stability_score(&history);
        assert!((0.0..=1.0).contains(&score));
    }
}

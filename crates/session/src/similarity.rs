//! Near-duplicate detection over candidate contents.

use std::collections::BTreeSet;

/// Similarity above which two candidates are considered duplicates.
/// Exactly at the threshold is *not* a duplicate.
pub const DUPLICATE_THRESHOLD: f64 = 0.85;

fn word_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Jaccard similarity of the case-folded, whitespace-tokenized word sets.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Whether `candidate` is a near-duplicate of any previously accepted content.
pub fn is_near_duplicate<'a>(
    candidate: &str,
    accepted: impl IntoIterator<Item = &'a str>,
) -> bool {
    accepted
        .into_iter()
        .any(|existing| jaccard_similarity(candidate, existing) > DUPLICATE_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_are_similarity_one() {
        assert_eq!(jaccard_similarity("ship the API", "ship the API"), 1.0);
    }

    #[test]
    fn case_and_whitespace_are_folded() {
        assert_eq!(jaccard_similarity("Ship  The API", "ship the api"), 1.0);
    }

    #[test]
    fn disjoint_texts_are_zero() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn exactly_at_threshold_is_not_duplicate() {
        // 17 shared words, 20 in the union → 0.85 exactly.
        let shared: Vec<String> = (0..17).map(|i| format!("w{i}")).collect();
        let a = format!("{} a1 a2 a3", shared.join(" "));
        let b = shared.join(" ");
        let sim = jaccard_similarity(&a, &b);
        assert!((sim - 0.85).abs() < 1e-9);
        assert!(!is_near_duplicate(&a, [b.as_str()]));
    }

    #[test]
    fn above_threshold_is_duplicate() {
        // 18 shared of 20 union → 0.9.
        let shared: Vec<String> = (0..18).map(|i| format!("w{i}")).collect();
        let a = format!("{} a1 a2", shared.join(" "));
        let b = shared.join(" ");
        assert!(jaccard_similarity(&a, &b) > DUPLICATE_THRESHOLD);
        assert!(is_near_duplicate(&a, [b.as_str()]));
    }

    #[test]
    fn light_rewording_alone_stays_below_the_bar() {
        let a = "Ship the new API by Q4";
        let b = "We should ship the new API by Q4";
        // 6 shared words of 8 in the union → 0.75. Short reworded pairs need
        // more overlap than this to count as duplicates.
        let sim = jaccard_similarity(a, b);
        assert!((sim - 0.75).abs() < 1e-9);
        assert!(!is_near_duplicate(a, [b]));
    }

    #[test]
    fn empty_against_empty_is_identical() {
        assert_eq!(jaccard_similarity("", "  "), 1.0);
        assert_eq!(jaccard_similarity("", "words"), 0.0);
    }
}

//! Windowed stream chunking — groups pending transcript segments into
//! time-bounded chunks and formats them for one LLM call.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use recap_core::{Chunk, Segment};

/// Fraction of the max window after which accumulation stops early.
const EARLY_STOP_FRACTION: f64 = 0.8;

/// Window and segment-count bounds for chunk selection.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    pub min_window_ms: i64,
    pub max_window_ms: i64,
    pub min_segments: usize,
    pub max_segments: usize,
}

/// Ordered buffer of pending segments with a processed-id set.
///
/// Selection never removes segments — the caller commits a selection only
/// after the chunk has been processed successfully, so a failed chunk leaves
/// its segments in place for the next tick.
#[derive(Debug, Default)]
pub struct Chunker {
    pending: Vec<Segment>,
    seen_ids: HashSet<String>,
    next_index: u32,
}

impl Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a segment. Returns `false` when the id was already added
    /// (pending or processed) — re-adding is a no-op.
    pub fn push(&mut self, segment: Segment) -> bool {
        if !self.seen_ids.insert(segment.id.clone()) {
            debug!(id = %segment.id, "duplicate segment ignored");
            return false;
        }
        self.pending.push(segment);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Select the next chunk's segments without removing them.
    ///
    /// Accumulates the earliest pending segments while the window stays
    /// within `max_window_ms` and the count below `max_segments`, stopping
    /// early once the window has consumed ≥80% of the maximum. Unless
    /// `flush` is set, a selection below `min_window_ms` or `min_segments`
    /// yields `None` — it must wait for more input.
    pub fn select(&self, limits: ChunkLimits, flush: bool) -> Option<Vec<Segment>> {
        if self.pending.is_empty() {
            return None;
        }

        let mut ordered: Vec<&Segment> = self.pending.iter().collect();
        ordered.sort_by_key(|s| (s.start_ms, s.end_ms));

        let first_start = ordered[0].start_ms;
        let early_stop_ms = (limits.max_window_ms as f64 * EARLY_STOP_FRACTION) as i64;
        let mut selected: Vec<Segment> = Vec::new();

        for segment in ordered {
            if selected.len() >= limits.max_segments {
                break;
            }
            if !selected.is_empty() && segment.end_ms - first_start > limits.max_window_ms {
                break;
            }
            selected.push(segment.clone());
            let window = segment.end_ms - first_start;
            if window >= early_stop_ms {
                break;
            }
        }

        let window = selected.last().map(|s| s.end_ms - first_start).unwrap_or(0);
        if !flush && (window < limits.min_window_ms || selected.len() < limits.min_segments) {
            return None;
        }
        Some(selected)
    }

    /// Remove processed segments from pending and advance the chunk index.
    /// Ids stay in the seen set so they can never be re-added.
    pub fn commit(&mut self, segment_ids: &[String]) {
        let committed: HashSet<&String> = segment_ids.iter().collect();
        self.pending.retain(|s| !committed.contains(&s.id));
        self.next_index += 1;
    }

    /// Assemble a [`Chunk`] from a selection at the current index.
    pub fn build_chunk(&self, meeting_id: Uuid, segments: &[Segment]) -> Chunk {
        let mut speaker_ids: Vec<String> = Vec::new();
        for segment in segments {
            if !speaker_ids.contains(&segment.speaker) {
                speaker_ids.push(segment.speaker.clone());
            }
        }
        Chunk {
            id: Uuid::new_v4(),
            meeting_id,
            chunk_index: self.next_index,
            window_start_ms: segments.first().map(|s| s.start_ms).unwrap_or(0),
            window_end_ms: segments.last().map(|s| s.end_ms).unwrap_or(0),
            content: format_transcript(segments),
            speaker_ids,
            segment_ids: segments.iter().map(|s| s.id.clone()).collect(),
        }
    }
}

/// Merge consecutive same-speaker segments into `"[SPEAKER]: ..."` lines
/// separated by blank lines. Speaker labels are taken verbatim.
pub fn format_transcript(segments: &[Segment]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current_speaker: Option<String> = None;

    for segment in segments {
        let text = segment.content.trim();
        if text.is_empty() {
            continue;
        }
        let continues_run = current_speaker.as_deref() == Some(segment.speaker.as_str());
        if continues_run {
            if let Some(line) = lines.last_mut() {
                line.push(' ');
                line.push_str(text);
            }
        } else {
            lines.push(format!("[{}]: {}", segment.speaker, text));
            current_speaker = Some(segment.speaker.clone());
        }
    }
    lines.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: ChunkLimits = ChunkLimits {
        min_window_ms: 20_000,
        max_window_ms: 60_000,
        min_segments: 2,
        max_segments: 30,
    };

    fn seg(id: &str, speaker: &str, start_ms: i64, end_ms: i64) -> Segment {
        Segment {
            id: id.to_string(),
            content: format!("segment {id}"),
            speaker: speaker.to_string(),
            start_ms,
            end_ms,
        }
    }

    // ── push ───────────────────────────────────────────────────────────────

    #[test]
    fn duplicate_ids_are_ignored() {
        let mut chunker = Chunker::new();
        assert!(chunker.push(seg("a", "S1", 0, 1_000)));
        assert!(!chunker.push(seg("a", "S1", 0, 1_000)));
        assert_eq!(chunker.pending_count(), 1);
    }

    #[test]
    fn committed_ids_cannot_be_readded() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 25_000));
        chunker.push(seg("b", "S1", 25_000, 26_000));
        let selection = chunker.select(LIMITS, false).unwrap();
        let ids: Vec<String> = selection.iter().map(|s| s.id.clone()).collect();
        chunker.commit(&ids);

        assert_eq!(chunker.pending_count(), 0);
        assert!(!chunker.push(seg("a", "S1", 0, 25_000)));
    }

    // ── selection bounds ───────────────────────────────────────────────────

    #[test]
    fn below_min_window_must_wait() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 5_000));
        chunker.push(seg("b", "S1", 5_000, 10_000));
        assert!(chunker.select(LIMITS, false).is_none());
    }

    #[test]
    fn below_min_segments_must_wait() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 25_000));
        assert!(chunker.select(LIMITS, false).is_none());
    }

    #[test]
    fn exact_minimums_may_emit() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 10_000));
        chunker.push(seg("b", "S1", 10_000, 20_000));
        let selection = chunker.select(LIMITS, false).unwrap();
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn flush_relaxes_minimums() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 5_000));
        let selection = chunker.select(LIMITS, true).unwrap();
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn flush_on_empty_is_none() {
        let chunker = Chunker::new();
        assert!(chunker.select(LIMITS, true).is_none());
    }

    #[test]
    fn window_never_exceeds_max() {
        let mut chunker = Chunker::new();
        // Second segment would stretch the window past 60 s.
        chunker.push(seg("a", "S1", 0, 30_000));
        chunker.push(seg("b", "S1", 30_000, 70_000));
        chunker.push(seg("c", "S1", 70_000, 75_000));
        let selection = chunker.select(LIMITS, true).unwrap();
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].id, "a");
    }

    #[test]
    fn early_stop_at_eighty_percent_of_max() {
        let mut chunker = Chunker::new();
        // 48 s = 80% of 60 s; the third segment must not be selected.
        chunker.push(seg("a", "S1", 0, 24_000));
        chunker.push(seg("b", "S1", 24_000, 48_000));
        chunker.push(seg("c", "S1", 48_000, 50_000));
        let selection = chunker.select(LIMITS, false).unwrap();
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn max_segment_count_is_respected() {
        let limits = ChunkLimits { max_segments: 3, ..LIMITS };
        let mut chunker = Chunker::new();
        for i in 0..5 {
            let start = i64::from(i) * 8_000;
            chunker.push(seg(&format!("s{i}"), "S1", start, start + 8_000));
        }
        let selection = chunker.select(limits, false).unwrap();
        assert_eq!(selection.len(), 3);
    }

    #[test]
    fn selection_sorts_by_start_time() {
        let mut chunker = Chunker::new();
        chunker.push(seg("late", "S1", 15_000, 25_000));
        chunker.push(seg("early", "S1", 0, 15_000));
        let selection = chunker.select(LIMITS, false).unwrap();
        assert_eq!(selection[0].id, "early");
    }

    #[test]
    fn failed_processing_leaves_pending_intact() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 25_000));
        chunker.push(seg("b", "S1", 25_000, 26_000));
        let _ = chunker.select(LIMITS, false).unwrap();
        // No commit — everything still pending.
        assert_eq!(chunker.pending_count(), 2);
    }

    // ── chunk assembly ─────────────────────────────────────────────────────

    #[test]
    fn chunk_indices_are_contiguous() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 0, 25_000));
        chunker.push(seg("b", "S1", 25_000, 26_000));
        chunker.push(seg("c", "S1", 60_000, 85_000));
        chunker.push(seg("d", "S1", 85_000, 86_000));

        let first = chunker.select(LIMITS, false).unwrap();
        let chunk0 = chunker.build_chunk(Uuid::new_v4(), &first);
        assert_eq!(chunk0.chunk_index, 0);
        chunker.commit(&chunk0.segment_ids);

        let second = chunker.select(LIMITS, false).unwrap();
        let chunk1 = chunker.build_chunk(Uuid::new_v4(), &second);
        assert_eq!(chunk1.chunk_index, 1);
    }

    #[test]
    fn chunk_window_covers_selection() {
        let mut chunker = Chunker::new();
        chunker.push(seg("a", "S1", 1_000, 12_000));
        chunker.push(seg("b", "S2", 12_000, 24_000));
        let selection = chunker.select(LIMITS, false).unwrap();
        let chunk = chunker.build_chunk(Uuid::new_v4(), &selection);
        assert_eq!(chunk.window_start_ms, 1_000);
        assert_eq!(chunk.window_end_ms, 24_000);
        assert_eq!(chunk.speaker_ids, vec!["S1".to_string(), "S2".to_string()]);
    }

    // ── formatting ─────────────────────────────────────────────────────────

    #[test]
    fn consecutive_same_speaker_segments_merge() {
        let mut a = seg("a", "SPEAKER_0", 0, 1_000);
        a.content = "Hello there.".to_string();
        let mut b = seg("b", "SPEAKER_0", 1_000, 2_000);
        b.content = "Quick update.".to_string();
        let mut c = seg("c", "SPEAKER_1", 2_000, 3_000);
        c.content = "Thanks.".to_string();

        let text = format_transcript(&[a, b, c]);
        assert_eq!(
            text,
            "[SPEAKER_0]: Hello there. Quick update.\n\n[SPEAKER_1]: Thanks."
        );
    }

    #[test]
    fn speaker_returning_starts_a_new_line() {
        let mut a = seg("a", "S1", 0, 1_000);
        a.content = "one".to_string();
        let mut b = seg("b", "S2", 1_000, 2_000);
        b.content = "two".to_string();
        let mut c = seg("c", "S1", 2_000, 3_000);
        c.content = "three".to_string();

        let text = format_transcript(&[a, b, c]);
        assert_eq!(text, "[S1]: one\n\n[S2]: two\n\n[S1]: three");
    }

    #[test]
    fn empty_content_segments_are_skipped() {
        let mut a = seg("a", "S1", 0, 1_000);
        a.content = "   ".to_string();
        let mut b = seg("b", "S1", 1_000, 2_000);
        b.content = "real".to_string();
        assert_eq!(format_transcript(&[a, b]), "[S1]: real");
    }
}

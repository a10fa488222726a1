//! C7 — Segment Mapper: turns transcript segments into a sorted, disjoint
//! list of abusive intervals (spec.md §4.6).
//!
//! Ground: `original_source/backend/services/profanity_detection_v2.py`'s
//! word-level span extraction and interval-merging pass.

#[cfg(test)]
use crate::asr::Word;
use crate::asr::TranscriptSegment;
use crate::detection::HybridDetector;
use crate::text_norm::normalize;
use serde::{Deserialize, Serialize};

/// A disjoint, real-valued interval flagged abusive, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbusiveInterval {
    pub start_s: f64,
    pub end_s: f64,
    pub confidence: f32,
    pub matched_words: Vec<String>,
    /// Highest `WordlistEntry::severity` among the regex matches this
    /// interval is built from, if any were found (§14).
    pub max_severity: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentMapperConfig {
    pub threshold: f32,
    pub merge_gap_s: f64,
    pub padding_before_s: f64,
    pub padding_after_s: f64,
}

impl Default for SegmentMapperConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            merge_gap_s: 0.12,
            padding_before_s: 0.05,
            padding_after_s: 0.05,
        }
    }
}

/// Run the full mapper algorithm (§4.6, steps 1-5) over `segments`,
/// clipping the final result to `[0, input_duration_s]`.
pub fn map_segments(
    segments: &[TranscriptSegment],
    detector: &HybridDetector,
    config: &SegmentMapperConfig,
    input_duration_s: f64,
) -> Vec<AbusiveInterval> {
    let mut raw = Vec::new();

    for segment in segments {
        if segment.text.trim().is_empty() {
            continue;
        }
        let result = detector.detect(&segment.text);
        if !result.is_abusive || result.confidence < config.threshold {
            continue;
        }

        if let Some(word_intervals) = word_level_intervals(segment, detector, result.confidence) {
            raw.extend(word_intervals);
        } else {
            let max_severity = detector
                .scan_regex(&segment.text)
                .iter()
                .map(|m| m.severity)
                .max();
            raw.push(AbusiveInterval {
                start_s: segment.start_s,
                end_s: segment.end_s,
                confidence: result.confidence,
                matched_words: Vec::new(),
                max_severity,
            });
        }
    }

    raw.sort_by(|a, b| a.start_s.partial_cmp(&b.start_s).unwrap());
    let merged = merge_intervals(raw, config.merge_gap_s);
    let padded = pad_intervals(merged, config.padding_before_s, config.padding_after_s, input_duration_s);
    padded
}

/// Step 2: when word-level timestamps are available, flag intervals that
/// cover exactly the spans of words the regex scanner hit. Returns `None`
/// when the segment has no word timestamps, or when the abusive decision
/// came only from the ML branch (no regex hit on any word) — the caller
/// then falls back to the whole-segment span.
fn word_level_intervals(
    segment: &TranscriptSegment,
    detector: &HybridDetector,
    segment_confidence: f32,
) -> Option<Vec<AbusiveInterval>> {
    if segment.words.is_empty() {
        return None;
    }

    let mut intervals = Vec::new();
    for word in &segment.words {
        let normalized = normalize(&word.text);
        if normalized.is_empty() {
            continue;
        }
        let matches = detector.scan_regex(&word.text);
        if !matches.is_empty() {
            let max_severity = matches.iter().map(|m| m.severity).max();
            intervals.push(AbusiveInterval {
                start_s: word.start_s,
                end_s: word.end_s,
                confidence: segment_confidence,
                matched_words: vec![word.text.clone()],
                max_severity,
            });
        }
    }

    if intervals.is_empty() {
        None
    } else {
        Some(intervals)
    }
}

/// Step 3: merge intervals that overlap or are separated by less than
/// `merge_gap_s`; union `matched_words`, take the max confidence.
fn merge_intervals(sorted: Vec<AbusiveInterval>, merge_gap_s: f64) -> Vec<AbusiveInterval> {
    let mut out: Vec<AbusiveInterval> = Vec::new();
    for interval in sorted {
        match out.last_mut() {
            Some(prev) if interval.start_s - prev.end_s < merge_gap_s => {
                prev.end_s = prev.end_s.max(interval.end_s);
                prev.confidence = prev.confidence.max(interval.confidence);
                prev.max_severity = match (prev.max_severity, interval.max_severity) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (Some(a), None) => Some(a),
                    (None, Some(b)) => Some(b),
                    (None, None) => None,
                };
                for w in interval.matched_words {
                    if !prev.matched_words.contains(&w) {
                        prev.matched_words.push(w);
                    }
                }
            }
            _ => out.push(interval),
        }
    }
    out
}

/// Step 4: expand each interval by the configured padding, clipped to
/// `[0, input_duration_s]`. Re-merges afterward since padding can cause
/// previously-disjoint intervals to touch.
fn pad_intervals(
    intervals: Vec<AbusiveInterval>,
    before_s: f64,
    after_s: f64,
    input_duration_s: f64,
) -> Vec<AbusiveInterval> {
    let padded: Vec<AbusiveInterval> = intervals
        .into_iter()
        .map(|mut i| {
            i.start_s = (i.start_s - before_s).max(0.0);
            i.end_s = (i.end_s + after_s).min(input_duration_s);
            i
        })
        .collect();
    merge_intervals(padded, 0.0)
}

/// Compute the complement of `intervals` within `[0, total_s]`, used by
/// cut-mode censoring (§4.7).
pub fn complement(intervals: &[AbusiveInterval], total_s: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    let mut cursor = 0.0;
    for interval in intervals {
        if interval.start_s > cursor {
            out.push((cursor, interval.start_s));
        }
        cursor = cursor.max(interval.end_s);
    }
    if cursor < total_s {
        out.push((cursor, total_s));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: f64, end: f64) -> AbusiveInterval {
        AbusiveInterval {
            start_s: start,
            end_s: end,
            confidence: 1.0,
            matched_words: Vec::new(),
            max_severity: None,
        }
    }

    #[test]
    fn merges_overlapping_and_close_intervals() {
        let merged = merge_intervals(vec![interval(0.0, 1.0), interval(1.05, 2.0)], 0.12);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].end_s, 2.0);
    }

    #[test]
    fn keeps_distant_intervals_separate() {
        let merged = merge_intervals(vec![interval(0.0, 1.0), interval(5.0, 6.0)], 0.12);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn padding_clips_to_bounds() {
        let padded = pad_intervals(vec![interval(0.0, 1.0)], 0.5, 0.5, 1.2);
        assert_eq!(padded[0].start_s, 0.0);
        assert_eq!(padded[0].end_s, 1.2);
    }

    #[test]
    fn complement_covers_gaps_between_intervals() {
        let gaps = complement(&[interval(1.0, 2.0), interval(4.0, 5.0)], 6.0);
        assert_eq!(gaps, vec![(0.0, 1.0), (2.0, 4.0), (5.0, 6.0)]);
    }

    #[test]
    fn complement_of_full_coverage_is_empty() {
        let gaps = complement(&[interval(0.0, 10.0)], 10.0);
        assert!(gaps.is_empty());
    }

    fn sample_word(text: &str, start: f64, end: f64) -> Word {
        Word {
            text: text.to_string(),
            start_s: start,
            end_s: end,
        }
    }

    #[test]
    fn word_level_fallback_to_segment_when_no_word_timestamps() {
        use crate::detection::{ClassifierHandle, CompiledPatternSet, EnsemblePolicy, HybridDetector};
        use crate::wordlist::{Wordlist, WordlistEntry};
        use std::collections::HashMap;

        let mut entries = HashMap::new();
        entries.insert("english".to_string(), vec![WordlistEntry::bare("fuck")]);
        let patterns = CompiledPatternSet::build(&Wordlist { entries });
        let detector = HybridDetector::new(patterns, ClassifierHandle::disabled(0.5), EnsemblePolicy::RegexOnly);

        let segment = TranscriptSegment {
            id: 0,
            text: "you fuck off".to_string(),
            start_s: 0.0,
            end_s: 2.0,
            words: Vec::new(),
            language_guess: None,
        };

        let config = SegmentMapperConfig::default();
        let intervals = map_segments(&[segment], &detector, &config, 2.0);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_s, 0.0);
    }

    #[test]
    fn word_level_precision_when_timestamps_present() {
        use crate::detection::{ClassifierHandle, CompiledPatternSet, EnsemblePolicy, HybridDetector};
        use crate::wordlist::{Wordlist, WordlistEntry};
        use std::collections::HashMap;

        let mut entries = HashMap::new();
        entries.insert("english".to_string(), vec![WordlistEntry::bare("fuck")]);
        let patterns = CompiledPatternSet::build(&Wordlist { entries });
        let detector = HybridDetector::new(patterns, ClassifierHandle::disabled(0.5), EnsemblePolicy::RegexOnly);

        let segment = TranscriptSegment {
            id: 0,
            text: "you fuck off".to_string(),
            start_s: 0.0,
            end_s: 2.0,
            words: vec![
                sample_word("you", 0.0, 0.3),
                sample_word("fuck", 0.4, 0.8),
                sample_word("off", 0.9, 2.0),
            ],
            language_guess: None,
        };

        let config = SegmentMapperConfig::default();
        let intervals = map_segments(&[segment], &detector, &config, 2.0);
        assert_eq!(intervals.len(), 1);
        assert!(intervals[0].start_s <= 0.4 - config.padding_before_s + 0.001);
        assert!(intervals[0].end_s >= 0.8);
    }
}

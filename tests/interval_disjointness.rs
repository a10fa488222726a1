//! Property test for testable invariant 1 (spec.md §8): the segment
//! mapper's output, viewed as a set of real intervals, is strictly sorted
//! and pairwise disjoint after merging, for arbitrary segment layouts.

use censorly::asr::{TranscriptSegment, Word};
use censorly::detection::{ClassifierHandle, CompiledPatternSet, EnsemblePolicy, HybridDetector};
use censorly::segment_mapper::{map_segments, SegmentMapperConfig};
use censorly::wordlist::{Wordlist, WordlistEntry};
use proptest::prelude::*;
use std::collections::HashMap;

fn detector() -> HybridDetector {
    let mut entries = HashMap::new();
    entries.insert(
        "english".to_string(),
        vec![WordlistEntry::bare("fuck"), WordlistEntry::bare("shit")],
    );
    let patterns = CompiledPatternSet::build(&Wordlist { entries });
    HybridDetector::new(patterns, ClassifierHandle::disabled(0.5), EnsemblePolicy::RegexOnly)
}

fn arbitrary_segment(seed: u64, start: f64) -> TranscriptSegment {
    let words = ["hello", "fuck", "world", "shit", "there", "clean", "text", "off"];
    let word = words[(seed as usize) % words.len()];
    let end = start + 0.4;
    TranscriptSegment {
        id: seed,
        text: format!("{word} filler text here"),
        start_s: start,
        end_s: end,
        words: vec![Word {
            text: word.to_string(),
            start_s: start,
            end_s: end,
        }],
        language_guess: None,
    }
}

proptest! {
    #[test]
    fn output_intervals_are_sorted_and_disjoint(seeds in prop::collection::vec(0u64..8, 0..20)) {
        let detector = detector();
        let config = SegmentMapperConfig::default();

        let mut segments = Vec::new();
        let mut t = 0.0;
        for seed in seeds {
            segments.push(arbitrary_segment(seed, t));
            t += 0.5;
        }
        let total_duration = t + 1.0;

        let intervals = map_segments(&segments, &detector, &config, total_duration);

        for pair in intervals.windows(2) {
            prop_assert!(pair[0].end_s <= pair[1].start_s, "intervals must be disjoint and sorted");
        }
        for interval in &intervals {
            prop_assert!(interval.start_s < interval.end_s);
            prop_assert!(interval.start_s >= 0.0);
            prop_assert!(interval.end_s <= total_duration);
        }
    }
}

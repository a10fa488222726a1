//! C4 — Hybrid Detector: combines the regex scanner (C2) and ML classifier
//! (C3) under a configurable ensemble policy, and tracks aggregate stats.
//!
//! Ground: `original_source/backend/services/hybrid_detector.py`'s
//! `detect`/`_combine_results` and its `self.stats` counter dict.

use crate::detection::ml_classifier::ClassifierHandle;
use crate::detection::regex_scanner::CompiledPatternSet;
use crate::detection::types::{DetectionMethod, DetectionResult, EnsemblePolicy, RegexMatch};
use std::sync::Mutex;
use std::time::Instant;

/// Running counters over all `detect` calls, guarded by a single short
/// critical section (no per-field locks; §9 "stats are a single snapshot").
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DetectorStats {
    pub total: u64,
    pub regex_hits: u64,
    pub ml_hits: u64,
    pub ensemble_hits: u64,
    pub agreements: u64,
    pub disagreements: u64,
    pub ml_errors: u64,
}

#[derive(Default)]
struct Counters {
    total: u64,
    regex_hits: u64,
    ml_hits: u64,
    ensemble_hits: u64,
    agreements: u64,
    disagreements: u64,
    ml_errors: u64,
}

/// Combines C2 and C3 under a single policy, per text, and keeps a running
/// stats snapshot. One `HybridDetector` is shared (read-mostly) across a
/// pipeline run; the pattern set and classifier are swapped, not mutated,
/// on reload.
pub struct HybridDetector {
    patterns: CompiledPatternSet,
    classifier: ClassifierHandle,
    policy: EnsemblePolicy,
    stats: Mutex<Counters>,
}

impl HybridDetector {
    pub fn new(patterns: CompiledPatternSet, classifier: ClassifierHandle, policy: EnsemblePolicy) -> Self {
        Self {
            patterns,
            classifier,
            policy,
            stats: Mutex::new(Counters::default()),
        }
    }

    pub fn stats(&self) -> DetectorStats {
        let c = self.stats.lock().expect("detector stats lock poisoned");
        DetectorStats {
            total: c.total,
            regex_hits: c.regex_hits,
            ml_hits: c.ml_hits,
            ensemble_hits: c.ensemble_hits,
            agreements: c.agreements,
            disagreements: c.disagreements,
            ml_errors: c.ml_errors,
        }
    }

    /// Raw C2 output, bypassing the ensemble policy. Used by the segment
    /// mapper (C7) for word-level precision (spec.md §4.6 step 2), which
    /// is defined in terms of the regex scanner specifically, not C4.
    pub fn scan_regex(&self, text: &str) -> Vec<RegexMatch> {
        self.patterns.find_all(text)
    }

    /// Per spec.md §7: `ml_only` with no loaded classifier is a fatal
    /// `detector_unavailable` condition, checked once by the pipeline
    /// runner before a job starts (not per-call).
    pub fn detector_unavailable(&self) -> bool {
        self.policy == EnsemblePolicy::MlOnly && !self.classifier.is_loaded()
    }

    /// Classify one span of text under the configured ensemble policy
    /// (spec.md §4.4). Never panics or returns an error: a disabled
    /// classifier degrades every policy except `ml_only` to regex-only.
    pub fn detect(&self, text: &str) -> DetectionResult {
        let started = Instant::now();

        let effective_policy = if !self.classifier.is_loaded() && self.policy != EnsemblePolicy::MlOnly {
            EnsemblePolicy::RegexOnly
        } else {
            self.policy
        };

        let result = match effective_policy {
            EnsemblePolicy::RegexOnly => self.detect_regex_only(text),
            EnsemblePolicy::MlOnly => self.detect_ml_only(text),
            EnsemblePolicy::FastFirst => self.detect_fast_first(text),
            EnsemblePolicy::Both => self.detect_both(text),
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let result = DetectionResult {
            time_ms: elapsed_ms,
            ..result
        };

        self.record_stats(&result);
        result
    }

    fn record_stats(&self, result: &DetectionResult) {
        let mut c = self.stats.lock().expect("detector stats lock poisoned");
        c.total += 1;
        match result.method {
            DetectionMethod::Regex => c.regex_hits += 1,
            DetectionMethod::Ml => c.ml_hits += 1,
            DetectionMethod::Ensemble => {
                c.ensemble_hits += 1;
                c.agreements += 1;
            }
            DetectionMethod::None => {}
        }
        if let Some(ml) = &result.ml {
            if ml.error.is_some() {
                c.ml_errors += 1;
            }
        }
    }

    fn regex_confidence(match_count: usize) -> f32 {
        (0.5 + 0.5 * match_count as f32).min(1.0)
    }

    fn detect_regex_only(&self, text: &str) -> DetectionResult {
        let regex_matches = self.patterns.find_all(text);
        let is_abusive = !regex_matches.is_empty();
        let confidence = if is_abusive {
            Self::regex_confidence(regex_matches.len())
        } else {
            0.0
        };
        DetectionResult {
            is_abusive,
            confidence,
            method: if is_abusive { DetectionMethod::Regex } else { DetectionMethod::None },
            regex_matches,
            ml: None,
            time_ms: 0.0,
        }
    }

    fn detect_ml_only(&self, text: &str) -> DetectionResult {
        let ml = self.classifier.predict(text);
        let is_abusive = ml.is_abusive;
        let confidence = ml.confidence;
        DetectionResult {
            is_abusive,
            confidence,
            method: if is_abusive { DetectionMethod::Ml } else { DetectionMethod::None },
            regex_matches: Vec::new(),
            ml: Some(ml),
            time_ms: 0.0,
        }
    }

    /// C2 first; on no match, return clean without consulting C3. On a
    /// match, C3 is always invoked to confirm/refine confidence — it can
    /// overturn the regex decision on disagreement (spec.md §4.4).
    fn detect_fast_first(&self, text: &str) -> DetectionResult {
        let regex_matches = self.patterns.find_all(text);
        if regex_matches.is_empty() {
            return DetectionResult {
                is_abusive: false,
                confidence: 0.0,
                method: DetectionMethod::None,
                regex_matches,
                ml: None,
                time_ms: 0.0,
            };
        }

        let regex_confidence = Self::regex_confidence(regex_matches.len());
        let ml = self.classifier.predict(text);

        if ml.is_abusive {
            DetectionResult {
                is_abusive: true,
                confidence: (regex_confidence + ml.confidence) / 2.0,
                method: DetectionMethod::Ensemble,
                regex_matches,
                ml: Some(ml),
                time_ms: 0.0,
            }
        } else {
            let mut stats = self.stats.lock().expect("detector stats lock poisoned");
            stats.disagreements += 1;
            drop(stats);
            DetectionResult {
                is_abusive: false,
                confidence: ml.confidence * 0.8,
                method: DetectionMethod::Ml,
                regex_matches,
                ml: Some(ml),
                time_ms: 0.0,
            }
        }
    }

    /// Always run both; abusive iff either flags. Confidence is the max of
    /// the two branches when they agree, and `0.7 · max(...)` when only
    /// one flags (spec.md §4.4).
    fn detect_both(&self, text: &str) -> DetectionResult {
        let regex_matches = self.patterns.find_all(text);
        let regex_hit = !regex_matches.is_empty();
        let regex_confidence = if regex_hit { Self::regex_confidence(regex_matches.len()) } else { 0.0 };

        let ml = self.classifier.predict(text);
        let ml_hit = ml.is_abusive;
        let ml_confidence = ml.confidence;

        let is_abusive = regex_hit || ml_hit;
        let agree = regex_hit == ml_hit;
        let confidence = if agree {
            regex_confidence.max(ml_confidence)
        } else {
            0.7 * regex_confidence.max(ml_confidence)
        };
        let method = match (regex_hit, ml_hit) {
            (true, true) => DetectionMethod::Ensemble,
            (true, false) => DetectionMethod::Regex,
            (false, true) => DetectionMethod::Ml,
            (false, false) => DetectionMethod::None,
        };

        if !agree {
            let mut stats = self.stats.lock().expect("detector stats lock poisoned");
            stats.disagreements += 1;
        }

        DetectionResult {
            is_abusive,
            confidence,
            method,
            regex_matches,
            ml: Some(ml),
            time_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordlist::{Wordlist, WordlistEntry};
    use std::collections::HashMap;

    fn patterns_with(words: &[&str]) -> CompiledPatternSet {
        let mut entries = HashMap::new();
        entries.insert(
            "english".to_string(),
            words.iter().map(|w| WordlistEntry::bare(*w)).collect(),
        );
        CompiledPatternSet::build(&Wordlist { entries })
    }

    fn detector(policy: EnsemblePolicy) -> HybridDetector {
        HybridDetector::new(patterns_with(&["fuck"]), ClassifierHandle::disabled(0.5), policy)
    }

    #[test]
    fn regex_only_flags_exact_match() {
        let d = detector(EnsemblePolicy::RegexOnly);
        let r = d.detect("you fuck off");
        assert!(r.is_abusive);
        assert_eq!(r.method, DetectionMethod::Regex);
    }

    #[test]
    fn ml_only_with_disabled_classifier_never_flags() {
        let d = detector(EnsemblePolicy::MlOnly);
        let r = d.detect("you fuck off");
        assert!(!r.is_abusive);
        assert_eq!(r.method, DetectionMethod::None);
        assert!(r.ml.as_ref().unwrap().error.is_some());
        assert!(d.detector_unavailable());
    }

    #[test]
    fn fast_first_falls_back_to_regex_only_when_classifier_disabled() {
        let d = detector(EnsemblePolicy::FastFirst);
        let r = d.detect("you fuck off");
        assert!(r.is_abusive);
        assert_eq!(r.method, DetectionMethod::Regex);
        assert!(r.ml.is_none());
    }

    #[test]
    fn clean_text_is_not_abusive_under_any_policy() {
        for policy in [
            EnsemblePolicy::RegexOnly,
            EnsemblePolicy::MlOnly,
            EnsemblePolicy::FastFirst,
            EnsemblePolicy::Both,
        ] {
            let d = detector(policy);
            let r = d.detect("have a nice day");
            assert!(!r.is_abusive);
        }
    }

    #[test]
    fn stats_accumulate_across_calls() {
        let d = detector(EnsemblePolicy::RegexOnly);
        d.detect("you fuck off");
        d.detect("hello world");
        let stats = d.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.regex_hits, 1);
    }

    /// S6: scenario from spec.md §8 with a live classifier that disagrees
    /// with a clean regex pass.
    #[test]
    fn both_policy_penalizes_single_branch_agreement() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        std::fs::write(
            &model_path,
            r#"{"vocab": {"fool": 0}, "weights": [5.0], "bias": 0.0, "hard_labels_only": true}"#,
        )
        .unwrap();
        let classifier = ClassifierHandle::load(&model_path, 0.5);

        let d = HybridDetector::new(patterns_with(&["fuck"]), classifier, EnsemblePolicy::Both);
        let r = d.detect("you're a fool");
        assert!(r.is_abusive);
        assert!((r.confidence - 0.7).abs() < 1e-6);
        assert_eq!(r.method, DetectionMethod::Ml);
    }
}

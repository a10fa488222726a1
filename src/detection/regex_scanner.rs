//! C2 — Regex Scanner: compiles multilingual profanity wordlists into
//! per-language alternations for fast yes/no and span matching.
//!
//! Ground: `original_source/backend/services/profanity_scanner.py`
//! (`_build_regex_pattern`, `_create_word_variations`, `find_profanity_matches`).

use crate::detection::types::RegexMatch;
use crate::text_norm::normalize;
use crate::wordlist::Wordlist;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Leetspeak replacement classes: (canonical letter, substitute characters).
const LEET_CLASSES: &[(char, &[char])] = &[
    ('a', &['@', '4']),
    ('e', &['3']),
    ('i', &['1', '!']),
    ('o', &['0']),
    ('s', &['$', '5']),
    ('t', &['7']),
    ('b', &['8']),
];

fn starts_and_ends_ascii_alpha(s: &str) -> bool {
    let first = s.chars().next();
    let last = s.chars().last();
    matches!(first, Some(c) if c.is_ascii_alphabetic()) && matches!(last, Some(c) if c.is_ascii_alphabetic())
}

/// Generate the bounded set of surface-form variations for one wordlist
/// entry surface, per spec.md §4.2's build step.
fn variations_for(surface: &str) -> HashSet<String> {
    let mut out = HashSet::new();
    let lower = surface.to_lowercase();

    out.insert(lower.clone());
    out.insert(normalize(&lower));
    out.insert(lower.replace(' ', ""));

    for sep in ['_', '-', '.'] {
        out.insert(lower.replace(' ', &sep.to_string()));
    }

    // Leetspeak variants: substitute at most one character of each class.
    for (letter, subs) in LEET_CLASSES {
        if let Some(pos) = lower.find(*letter) {
            for sub in *subs {
                let mut chars: Vec<char> = lower.chars().collect();
                // `pos` is a byte index from `find`; recompute as char index.
                let char_idx = lower[..pos].chars().count();
                chars[char_idx] = *sub;
                out.insert(chars.into_iter().collect());
            }
        }
    }

    out.retain(|s| !s.is_empty() && s.chars().count() > 1);
    out
}

/// An immutable, compiled set of per-language alternations. Built once from
/// a `Wordlist` document and swapped atomically into a shared reference on
/// reload; never mutated after construction (spec.md §9).
#[derive(Debug, Default)]
pub struct CompiledPatternSet {
    patterns: HashMap<String, Regex>,
    /// Per-language map from a compiled variation string back to the
    /// highest severity among the wordlist entries that produced it, so a
    /// match can be traced back to §3's "severity" metadata.
    severities: HashMap<String, HashMap<String, u8>>,
}

impl CompiledPatternSet {
    /// Build a pattern set from a wordlist document. Languages whose
    /// pattern fails to compile are skipped with a warning; the rest
    /// remain usable (§4.2 failure mode).
    pub fn build(wordlist: &Wordlist) -> Self {
        let mut patterns = HashMap::new();
        let mut severities = HashMap::new();

        for (language, entries) in &wordlist.entries {
            let mut all_variations: HashMap<String, u8> = HashMap::new();
            for entry in entries {
                for variation in variations_for(&entry.surface) {
                    all_variations
                        .entry(variation)
                        .and_modify(|s| *s = (*s).max(entry.severity))
                        .or_insert(entry.severity);
                }
            }

            if all_variations.is_empty() {
                continue;
            }

            let mut sorted: Vec<String> = all_variations.keys().cloned().collect();
            sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

            let parts: Vec<String> = sorted
                .iter()
                .map(|w| {
                    let escaped = regex::escape(w);
                    if starts_and_ends_ascii_alpha(w) {
                        format!(r"\b{escaped}\b")
                    } else {
                        escaped
                    }
                })
                .collect();

            let pattern_str = format!("(?i){}", parts.join("|"));
            match Regex::new(&pattern_str) {
                Ok(re) => {
                    patterns.insert(language.clone(), re);
                    severities.insert(language.clone(), all_variations);
                }
                Err(e) => {
                    warn!(language = %language, error = %e, "failed to compile profanity pattern; skipping language");
                }
            }
        }

        Self { patterns, severities }
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    /// Fast yes/no test: normalize input then test against every language
    /// pattern, short-circuiting on first match.
    pub fn contains(&self, text: &str) -> bool {
        if self.patterns.is_empty() || text.is_empty() {
            return false;
        }
        let normalized = normalize(text);
        self.patterns.values().any(|re| re.is_match(&normalized))
    }

    /// Collect all non-overlapping matches across languages. On overlap,
    /// the longest-earliest match wins (leftmost-longest).
    pub fn find_all(&self, text: &str) -> Vec<RegexMatch> {
        if self.patterns.is_empty() || text.is_empty() {
            return Vec::new();
        }
        let normalized = normalize(text);

        let mut candidates: Vec<RegexMatch> = Vec::new();
        for (language, re) in &self.patterns {
            let language_severities = self.severities.get(language);
            for m in re.find_iter(&normalized) {
                let severity = language_severities
                    .and_then(|sev| sev.get(m.as_str()))
                    .copied()
                    .unwrap_or(0);
                candidates.push(RegexMatch {
                    surface: m.as_str().to_string(),
                    language_tag: language.clone(),
                    start_char: normalized[..m.start()].chars().count(),
                    end_char: normalized[..m.end()].chars().count(),
                    severity,
                });
            }
        }

        candidates.sort_by(|a, b| {
            a.start_char
                .cmp(&b.start_char)
                .then((b.end_char - b.start_char).cmp(&(a.end_char - a.start_char)))
        });

        let mut out: Vec<RegexMatch> = Vec::new();
        let mut covered_until = 0usize;
        for m in candidates {
            if m.start_char >= covered_until {
                covered_until = m.end_char;
                out.push(m);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wordlist::WordlistEntry;
    use std::collections::HashMap;

    fn wl(pairs: &[(&str, &[&str])]) -> Wordlist {
        let mut entries = HashMap::new();
        for (lang, words) in pairs {
            entries.insert(
                lang.to_string(),
                words.iter().map(|w| WordlistEntry::bare(*w)).collect(),
            );
        }
        Wordlist { entries }
    }

    #[test]
    fn detects_plain_match() {
        let set = CompiledPatternSet::build(&wl(&[("english", &["fuck"])]));
        assert!(set.contains("you fuck off"));
        assert!(!set.contains("hello world"));
    }

    #[test]
    fn detects_leetspeak_variant() {
        let set = CompiledPatternSet::build(&wl(&[("english", &["fuck"])]));
        assert!(set.contains("you fuuck off") || set.contains("you fu*ck off"));
    }

    #[test]
    fn find_all_resolves_overlaps_longest_earliest() {
        let set = CompiledPatternSet::build(&wl(&[("english", &["ass", "asshole"])]));
        let matches = set.find_all("you are an asshole");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].surface, "asshole");
    }

    #[test]
    fn skips_language_on_empty_wordlist() {
        let set = CompiledPatternSet::build(&wl(&[]));
        assert!(!set.contains("anything"));
        assert_eq!(set.languages().count(), 0);
    }
}

//! Text normalization for profanity matching
//!
//! Produces a deterministic canonical form of input text that preserves
//! semantic content for matching while neutralizing common obfuscation
//! (leetspeak, separators, repeated characters).

use unicode_normalization::UnicodeNormalization;

/// Confusable-character substitution table applied after NFKD decomposition.
const CONFUSABLES: &[(char, char)] = &[
    ('@', 'a'),
    ('$', 's'),
    ('0', 'o'),
    ('1', 'i'),
    ('3', 'e'),
    ('4', 'a'),
    ('5', 's'),
    ('7', 't'),
    ('8', 'b'),
    ('!', 'i'),
];

/// Codepoint ranges left untouched by punctuation stripping: Devanagari and
/// Arabic/Urdu script, so mixed-script wordlist entries keep matching.
fn is_preserved_script(c: char) -> bool {
    let cp = c as u32;
    (0x0900..=0x097F).contains(&cp) || (0x0600..=0x06FF).contains(&cp)
}

fn substitute_confusable(c: char) -> char {
    CONFUSABLES
        .iter()
        .find(|(from, _)| *from == c)
        .map(|(_, to)| *to)
        .unwrap_or(c)
}

/// Collapse runs of the same character longer than 2 down to length 2.
fn collapse_repeats(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev: Option<char> = None;
    let mut run = 0usize;

    for c in input.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            prev = Some(c);
            run = 1;
        }
        if run <= 2 {
            out.push(c);
        }
    }
    out
}

/// Canonicalize `text` for profanity matching.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)` for all `x`.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // 1. Lowercase (Unicode-aware), 2. NFKD decompose and drop combining marks.
    let lowered = text.to_lowercase();
    let decomposed: String = lowered
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    // 3. Confusable substitution.
    let substituted: String = decomposed.chars().map(substitute_confusable).collect();

    // 4. Collapse long repeats.
    let collapsed = collapse_repeats(&substituted);

    // 5. Replace non-alphanumeric (outside preserved scripts) with spaces, collapse whitespace.
    let mut spaced = String::with_capacity(collapsed.len());
    for c in collapsed.chars() {
        if c.is_alphanumeric() || is_preserved_script(c) || c.is_whitespace() {
            spaced.push(c);
        } else {
            spaced.push(' ');
        }
    }

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_and_collapses_whitespace() {
        assert_eq!(normalize("Hello   World"), "hello world");
    }

    #[test]
    fn substitutes_confusables() {
        assert_eq!(normalize("fuuuck"), "fuuck");
        assert_eq!(normalize("@ssh0le"), "asshole");
    }

    #[test]
    fn collapses_long_repeats_but_keeps_doubles() {
        assert_eq!(normalize("sooo good"), "soo good");
        assert_eq!(normalize("moon"), "moon");
    }

    #[test]
    fn preserves_devanagari_and_arabic_script() {
        let hin = normalize("चूतिया");
        assert!(hin.chars().all(|c| (0x0900..=0x097F).contains(&(c as u32)) || c == ' '));
    }

    #[test]
    fn strips_punctuation_to_single_spaces() {
        assert_eq!(normalize("f-u.c_k!!"), "f u c i");
    }

    #[test]
    fn idempotent_on_fixed_cases() {
        for s in ["Hello World", "@ssh0le", "fuuuuuck", "  spaced  out  "] {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice);
        }
    }

    proptest! {
        #[test]
        fn idempotent_normalization(s in ".{0,64}") {
            let once = normalize(&s);
            let twice = normalize(&once);
            prop_assert_eq!(once, twice);
        }
    }
}

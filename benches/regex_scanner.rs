//! Benchmarks for the compiled pattern set (C2). Tracks the single-core
//! latency contract referenced in spec.md §4.3 for the surrounding
//! ensemble ("the ensemble policy is tolerant" of classifier latency, but
//! the regex branch runs on every call under `fast_first`/`both`).

use censorly::wordlist::{Wordlist, WordlistEntry};
use censorly::detection::CompiledPatternSet;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;

fn sample_wordlist() -> Wordlist {
    let mut entries = HashMap::new();
    entries.insert(
        "english".to_string(),
        vec![
            WordlistEntry::bare("fuck"),
            WordlistEntry::bare("shit"),
            WordlistEntry::bare("bastard"),
            WordlistEntry::bare("asshole"),
        ],
    );
    entries.insert(
        "hinglish".to_string(),
        vec![WordlistEntry::bare("chutiya"), WordlistEntry::bare("bhosdike")],
    );
    Wordlist { entries }
}

const SAMPLE_TEXT: &str =
    "well you know what, this is just a completely clean sentence about the weather today and nothing else at all";

fn bench_find_all(c: &mut Criterion) {
    let patterns = CompiledPatternSet::build(&sample_wordlist());
    c.bench_function("regex_scanner_find_all_clean_text", |b| {
        b.iter(|| patterns.find_all(black_box(SAMPLE_TEXT)))
    });

    let abusive = "you fuck off you absolute bastard";
    c.bench_function("regex_scanner_find_all_abusive_text", |b| {
        b.iter(|| patterns.find_all(black_box(abusive)))
    });
}

fn bench_build(c: &mut Criterion) {
    let wordlist = sample_wordlist();
    c.bench_function("regex_scanner_build_pattern_set", |b| {
        b.iter(|| CompiledPatternSet::build(black_box(&wordlist)))
    });
}

criterion_group!(benches, bench_find_all, bench_build);
criterion_main!(benches);

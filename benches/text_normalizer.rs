//! Benchmarks for the text normalizer (C1). Every word and every segment
//! text passes through this on the hot path (segment mapper word-level
//! precision, regex scanner input normalization), so its cost sets a floor
//! under the rest of the detection pipeline.

use censorly::text_norm::normalize;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SHORT: &str = "fuuuuck";
const OBFUSCATED: &str = "f@$$h0le!!";
const LONG: &str = "this is a much longer sentence that exercises the NFKD decomposition and confusable substitution pass across many words in sequence without any obfuscation at all";

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_short_obfuscated_word", |b| {
        b.iter(|| normalize(black_box(OBFUSCATED)))
    });
    c.bench_function("normalize_repeated_chars", |b| b.iter(|| normalize(black_box(SHORT))));
    c.bench_function("normalize_long_sentence", |b| b.iter(|| normalize(black_box(LONG))));
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);

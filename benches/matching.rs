//! Benchmarks for hwsed pattern matching
//!
//! Compares the host literal path against the host regex path on synthetic
//! log-like input; the device path is exercised end to end by the test suite
//! when CUDA is available.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hwsed::literal::find_literal_matches;
use hwsed::nfa::find_regex_matches;
use hwsed::regex::compile_pattern;
use hwsed::{Pattern, PatternKind, SubstFlags};

fn synthetic_log(lines: usize) -> Vec<u8> {
    let mut text = Vec::new();
    for i in 0..lines {
        if i % 17 == 0 {
            text.extend_from_slice(b"ERROR request failed with code 500\n");
        } else {
            text.extend_from_slice(b"INFO request completed in 12ms\n");
        }
    }
    text
}

fn global_flags() -> SubstFlags {
    SubstFlags {
        global: true,
        ..SubstFlags::default()
    }
}

fn bench_literal_scan(c: &mut Criterion) {
    let text = synthetic_log(10_000);
    let flags = global_flags();

    c.bench_function("literal_scan_10k_lines", |b| {
        b.iter(|| find_literal_matches(black_box(&text), b"ERROR", &flags))
    });
}

fn bench_literal_case_insensitive(c: &mut Criterion) {
    let text = synthetic_log(10_000);
    let flags = SubstFlags {
        global: true,
        case_insensitive: true,
        ..SubstFlags::default()
    };

    c.bench_function("literal_scan_folded", |b| {
        b.iter(|| find_literal_matches(black_box(&text), b"error", &flags))
    });
}

fn bench_regex_scan(c: &mut Criterion) {
    let text = synthetic_log(10_000);
    let pattern = Pattern::new(b"code [0-9]+".to_vec(), PatternKind::RegexExtended);
    let nfa = compile_pattern(&pattern, false).unwrap();
    let flags = global_flags();

    c.bench_function("regex_scan_10k_lines", |b| {
        b.iter(|| find_regex_matches(black_box(&text), &nfa, &flags))
    });
}

fn bench_regex_anchored(c: &mut Criterion) {
    let text = synthetic_log(10_000);
    let pattern = Pattern::new(b"^ERROR".to_vec(), PatternKind::RegexExtended);
    let nfa = compile_pattern(&pattern, false).unwrap();
    let flags = global_flags();

    c.bench_function("regex_scan_anchored", |b| {
        b.iter(|| find_regex_matches(black_box(&text), &nfa, &flags))
    });
}

criterion_group!(
    benches,
    bench_literal_scan,
    bench_literal_case_insensitive,
    bench_regex_scan,
    bench_regex_anchored
);
criterion_main!(benches);

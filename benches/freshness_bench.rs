// benches/freshness_bench.rs

//! Freshness classifier benchmarks.
//!
//! The classifier sits on the hot path of every cacheable request, so it
//! must stay a branch-and-arithmetic pure function; this bench keeps an
//! eye on its single-threaded verdict throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use restatic::core::freshness::{self, FreshnessState};
use std::hint::black_box;

fn bench_freshness(c: &mut Criterion) {
    let mut group = c.benchmark_group("freshness");

    group.bench_function("verdict_fresh", |b| {
        b.iter(|| {
            freshness::classify(
                black_box(1_700_000_000),
                black_box(60),
                black_box(Some(30)),
                black_box(1_700_000_030),
            )
        })
    });

    group.bench_function("verdict_sweep", |b| {
        // Sweeps ages across all three states, so branch prediction
        // cannot settle on a single outcome.
        b.iter(|| {
            let mut expired = 0u64;
            for age in 0..200u64 {
                let verdict = freshness::classify(
                    black_box(1_700_000_000),
                    black_box(60),
                    black_box(None),
                    black_box(1_700_000_000 + age),
                );
                if verdict.state == FreshnessState::Expired {
                    expired += 1;
                }
            }
            black_box(expired)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_freshness);
criterion_main!(benches);

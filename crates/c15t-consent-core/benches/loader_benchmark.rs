// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Criterion benchmark suite for the consent evaluator and script loader.
//!
//! Benchmarks cover:
//!
//! - Condition evaluation (leaf, wide `or`, deep nesting)
//! - Steady-state reconcile (no transitions)
//! - Full grant / revoke cycles over a realistic script registry
//!
//! Run with: `cargo bench --bench loader_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use c15t_consent_core::{
    condition::{evaluate, Condition},
    config::LoaderConfig,
    descriptor::ScriptDescriptor,
    dom::InMemoryDom,
    element_id::RandomTokens,
    loader::ScriptLoader,
    types::{Category, ConsentState},
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `not(not(... not(marketing)))`, `depth` levels deep.
fn nested(depth: usize) -> Condition {
    (0..depth).fold(Condition::category(Category::Marketing), |inner, _| Condition::negate(inner))
}

fn registry(size: usize) -> Vec<ScriptDescriptor> {
    (0..size)
        .map(|index| {
            let category = Category::ALL[index % Category::ALL.len()];
            ScriptDescriptor::external(
                format!("vendor-{index:03}"),
                format!("https://cdn.example.com/vendor-{index:03}.js"),
                Condition::category(category),
            )
            .persist_after_consent_revoked(index % 7 == 0)
        })
        .collect()
}

fn loader() -> ScriptLoader<InMemoryDom> {
    ScriptLoader::with_token_source(
        InMemoryDom::new(),
        LoaderConfig::default(),
        Box::new(RandomTokens::seeded(0)),
    )
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn evaluate_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("evaluate");
    let state = ConsentState::necessary_only().with(Category::Marketing, true);

    let leaf = Condition::category(Category::Marketing);
    group.bench_function("leaf", |bencher| {
        bencher.iter(|| black_box(evaluate(black_box(&leaf), black_box(&state))));
    });

    // Worst case for `or`: only the last child is granted.
    let wide = Condition::any_of(
        [
            Category::Functionality,
            Category::Measurement,
            Category::Experience,
            Category::Marketing,
        ]
        .into_iter()
        .map(Condition::category)
        .collect(),
    )
    .unwrap();
    group.bench_function("wide_or_last_true", |bencher| {
        bencher.iter(|| black_box(evaluate(black_box(&wide), black_box(&state))));
    });

    for depth in [4usize, 16, 64] {
        let condition = nested(depth);
        group.bench_with_input(BenchmarkId::new("nested_not", depth), &condition, |bencher, c| {
            bencher.iter(|| black_box(evaluate(black_box(c), black_box(&state))));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

fn reconcile_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("reconcile");
    let granted = ConsentState::all_granted();
    let denied = ConsentState::necessary_only();

    for size in [10usize, 50, 200] {
        group.bench_with_input(BenchmarkId::new("steady_state", size), &size, |bencher, &size| {
            let mut loader = loader();
            loader.set_scripts(registry(size), &granted).unwrap();
            bencher.iter(|| black_box(loader.reconcile(black_box(&granted)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("grant_revoke", size), &size, |bencher, &size| {
            let mut loader = loader();
            loader.set_scripts(registry(size), &denied).unwrap();
            bencher.iter(|| {
                black_box(loader.reconcile(&granted).unwrap());
                black_box(loader.reconcile(&denied).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, evaluate_benchmark, reconcile_benchmark);
criterion_main!(benches);

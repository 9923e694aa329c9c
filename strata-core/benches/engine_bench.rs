//! Criterion benchmarks for Strata hot paths.
//!
//! Benchmarks:
//! 1. Single run (bar loop with SMA crossover over aligned data)
//! 2. Batch run (parameter grid at several parallelism levels)
//! 3. SMA column computation
//! 4. Alignment of ragged per-asset bars

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal_macros::dec;

use strata_core::data::{align, RawBar, TimeSeriesTable};
use strata_core::domain::{AssetRegistry, Book};
use strata_core::strategy::{sma, Params, SmaCrossover};
use strata_core::StrategyRunner;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_raw_bars(n: usize, phase: f64) -> Vec<RawBar> {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1 + phase).sin() * 10.0;
            RawBar {
                timestamp: base + chrono::Duration::days(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: Some(1_000_000.0 + (i % 500) as f64),
            }
        })
        .collect()
}

fn make_bars_by_asset(n: usize, assets: usize) -> BTreeMap<String, Vec<RawBar>> {
    (0..assets)
        .map(|a| (format!("SYM{a:02}"), make_raw_bars(n, a as f64)))
        .collect()
}

fn make_runner(n: usize, assets: usize) -> StrategyRunner {
    let table = align(&make_bars_by_asset(n, assets)).unwrap();
    let names: Vec<String> = table.assets().into_iter().map(String::from).collect();
    StrategyRunner::new(
        Arc::new(table),
        AssetRegistry::from_names(names).unwrap(),
        vec![Box::new(SmaCrossover::new(100))],
        vec![Book::new("Main", dec!(1000000))],
    )
    .unwrap()
}

fn sma_params(short: i64, long: i64) -> Params {
    Params::new().with("days_short", short).with("days_long", long)
}

// ── 1. Single Run ────────────────────────────────────────────────────

fn bench_single_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_run");
    let params = sma_params(20, 50);

    for &bar_count in &[252, 1260, 2520] {
        let runner = make_runner(bar_count, 1);
        group.bench_with_input(
            BenchmarkId::new("sma_crossover", bar_count),
            &bar_count,
            |b, _| b.iter(|| runner.run(black_box(&params))),
        );
    }

    // Multi-asset (the realistic case)
    let runner = make_runner(1260, 10);
    group.bench_function("10_assets_1260_bars", |b| {
        b.iter(|| runner.run(black_box(&params)))
    });

    group.finish();
}

// ── 2. Batch Run ─────────────────────────────────────────────────────

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_run");
    group.sample_size(10);

    let runner = make_runner(1260, 4);
    let sets: Vec<Params> = (5..13)
        .flat_map(|s| (30..34).map(move |l| sma_params(s, l)))
        .collect();

    for &parallelism in &[1, 2, 4] {
        group.bench_with_input(
            BenchmarkId::new("32_sets", parallelism),
            &parallelism,
            |b, &p| b.iter(|| runner.run_batch(black_box(&sets), p)),
        );
    }

    group.finish();
}

// ── 3. SMA Columns ───────────────────────────────────────────────────

fn bench_sma(c: &mut Criterion) {
    let mut group = c.benchmark_group("sma");

    for &bar_count in &[252, 2520, 25200] {
        let closes: Vec<f64> = make_raw_bars(bar_count, 0.0)
            .iter()
            .map(|b| b.close)
            .collect();
        group.bench_with_input(BenchmarkId::new("period_50", bar_count), &bar_count, |b, _| {
            b.iter(|| sma(black_box(&closes), 50))
        });
    }

    group.finish();
}

// ── 4. Alignment ─────────────────────────────────────────────────────

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");

    // Every third asset drops every seventh bar so the union has gaps.
    let mut ragged = make_bars_by_asset(2520, 12);
    for (i, bars) in ragged.values_mut().enumerate() {
        if i % 3 == 0 {
            let mut j = 0;
            bars.retain(|_| {
                j += 1;
                j % 7 != 0
            });
        }
    }

    group.bench_function("12_assets_2520_bars", |b| {
        b.iter(|| -> TimeSeriesTable { align(black_box(&ragged)).unwrap() })
    });

    group.finish();
}

criterion_group!(benches, bench_single_run, bench_batch, bench_sma, bench_align);
criterion_main!(benches);

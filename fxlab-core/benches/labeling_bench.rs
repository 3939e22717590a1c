//! Criterion benchmarks for the labeling hot paths.
//!
//! Benchmarks:
//! 1. ATR precompute (true range + SMA smoothing)
//! 2. Single-position simulation (long and short, fixed stop)
//! 3. Full labeling pass (fixed stop vs ATR stop)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fxlab_core::indicators::atr_sma;
use fxlab_core::{label, Bar, LabelParams, PriceSeries, Side, TradeSimulator};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_series(n: usize) -> PriceSeries {
    let base_date = chrono::NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let bars = (0..n)
        .map(|i| {
            let close = 1.10 + (i as f64 * 0.1).sin() * 0.03;
            let open = close - 0.0008;
            let high = close + 0.006;
            let low = open - 0.006;
            Bar::new(base_date + chrono::Duration::days(i as i64), open, high, low, close)
        })
        .collect();
    PriceSeries::new(bars).unwrap()
}

fn fixed_params() -> LabelParams {
    LabelParams::builder()
        .horizon_days(4)
        .tp_pct(0.01)
        .fixed_stop(0.005)
        .build()
        .unwrap()
}

fn atr_params() -> LabelParams {
    LabelParams::builder()
        .horizon_days(4)
        .tp_pct(0.01)
        .atr_stop(14, 1.0)
        .build()
        .unwrap()
}

// ── 1. ATR ───────────────────────────────────────────────────────────

fn bench_atr(c: &mut Criterion) {
    let mut group = c.benchmark_group("atr_precompute");

    for &bar_count in &[1_300, 2_600, 5_200] {
        let series = make_series(bar_count);
        group.bench_with_input(BenchmarkId::new("atr_14", bar_count), &bar_count, |b, _| {
            b.iter(|| atr_sma(black_box(series.bars()), 14));
        });
    }

    group.finish();
}

// ── 2. Simulation ────────────────────────────────────────────────────

fn bench_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("trade_simulation");
    let series = make_series(2_600);
    let sim = TradeSimulator::new(&series, fixed_params());

    group.bench_function("long_short_2600_days", |b| {
        b.iter(|| {
            for idx in 0..series.len() {
                let _ = black_box(sim.simulate_at(idx, Side::Long));
                let _ = black_box(sim.simulate_at(idx, Side::Short));
            }
        });
    });

    group.finish();
}

// ── 3. Labeling ──────────────────────────────────────────────────────

fn bench_labeling(c: &mut Criterion) {
    let mut group = c.benchmark_group("labeling");

    for &bar_count in &[1_300, 5_200] {
        let series = make_series(bar_count);
        let fixed = fixed_params();
        let atr = atr_params();

        group.bench_with_input(BenchmarkId::new("fixed_stop", bar_count), &bar_count, |b, _| {
            b.iter(|| label(black_box(&series), black_box(&fixed)));
        });
        group.bench_with_input(BenchmarkId::new("atr_stop", bar_count), &bar_count, |b, _| {
            b.iter(|| label(black_box(&series), black_box(&atr)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_atr, bench_simulation, bench_labeling);
criterion_main!(benches);

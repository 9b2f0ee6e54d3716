//! Benchmarks for indicator computation and symbol scans.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use candle_scout::prelude::*;

/// Deterministic pseudo-random walk
fn generate_candles(n: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut candles = Vec::with_capacity(n);
    let mut price = 100.0;

    for i in 0..n {
        let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0;
        let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;

        let open = price;
        let close = (price + change).max(1.0);
        let high = open.max(close) + volatility * 0.5;
        let low = (open.min(close) - volatility * 0.5).max(0.5);
        let volume = 1_000.0 + ((i * 11) % 37) as f64 * 25.0;

        candles.push(Candle::new(start + Duration::hours(i as i64), open, high, low, close, volume));
        price = close;
    }

    candles
}

fn bench_supertrend(c: &mut Criterion) {
    let mut group = c.benchmark_group("supertrend");
    let params = SupertrendParams::default();

    for size in [100, 1_000] {
        let candles = generate_candles(size);

        group.bench_with_input(BenchmarkId::new("incremental", size), &candles, |b, candles| {
            b.iter(|| black_box(supertrend_series(black_box(candles), params)))
        });

        group.bench_with_input(BenchmarkId::new("from_scratch_last", size), &candles, |b, candles| {
            b.iter(|| black_box(supertrend_at(black_box(candles), candles.len() - 1, params)))
        });
    }

    group.finish();
}

fn bench_rsi(c: &mut Criterion) {
    let closes: Vec<f64> = generate_candles(1_000).iter().map(|c| c.close).collect();

    c.bench_function("rsi_1000_closes", |b| {
        b.iter(|| black_box(rsi(black_box(&closes), 14)))
    });
}

fn bench_symbol_scan(c: &mut Criterion) {
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    let candles = generate_candles(100);
    let since = candles[0].open_time;
    let data = SymbolData::hourly_only(CandleWindow::from_closed(
        Symbol::new("BENCHUSDT"),
        Interval::H1,
        candles,
    ));

    c.bench_function("scan_last_closed_100_bars", |b| {
        b.iter(|| black_box(engine.scan(black_box(&data), None)))
    });

    c.bench_function("scan_all_100_bars", |b| {
        b.iter(|| black_box(engine.scan(black_box(&data), Some(since))))
    });
}

criterion_group!(benches, bench_supertrend, bench_rsi, bench_symbol_scan);
criterion_main!(benches);

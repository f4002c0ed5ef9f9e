//! Benchmarks for candlestick and chart pattern detection.

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use klinescan::prelude::*;
use rust_decimal::Decimal;

/// Generate deterministic pseudo-random daily bars
fn generate_bars(n: usize) -> Vec<CandleStick> {
  let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = Decimal::from(100);

  for i in 0..n {
    let change = Decimal::from(((i * 7 + 13) % 100) as i64) / Decimal::from(50) - Decimal::ONE;
    let volatility = Decimal::TWO + Decimal::from(((i * 3) % 10) as i64) / Decimal::from(5);
    let half = volatility / Decimal::TWO;

    let o = price;
    let c = price + change;
    let h = o.max(c) + half;
    let l = o.min(c) - half;
    let v = 1_000 + ((i * 37) % 500) as u64;

    bars.push(CandleStick::new(start + chrono::Duration::days(i as i64), o, h, l, c, v).unwrap());
    price = c;
  }

  bars
}

fn bench_single_detector(c: &mut Criterion) {
  let bars = generate_bars(250);
  let engine = EngineBuilder::new().add(EngulfingDetector::with_defaults()).build().unwrap();

  c.bench_function("detect_engulfing_250_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.detect(black_box(&bars), None));
    })
  });
}

fn bench_all_patterns(c: &mut Criterion) {
  let bars = generate_bars(250);
  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  c.bench_function("detect_all_patterns_250_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.detect(black_box(&bars), None));
    })
  });
}

fn bench_pivot_scan(c: &mut Criterion) {
  let scanner = PivotScanner::default();
  let mut group = c.benchmark_group("pivots");

  for size in [100, 500, 1000, 5000].iter() {
    let bars = generate_bars(*size);

    group.bench_with_input(BenchmarkId::new("scan", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(scanner.scan(black_box(&bars)));
      })
    });
  }

  group.finish();
}

fn bench_scan_history(c: &mut Criterion) {
  let engine = EngineBuilder::new().with_candlestick_defaults().build().unwrap();
  let mut group = c.benchmark_group("history");

  for size in [100, 250, 500].iter() {
    let bars = generate_bars(*size);

    group.bench_with_input(BenchmarkId::new("scan_history", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.scan_history(black_box(&bars), None));
      })
    });
  }

  group.finish();
}

fn bench_parallel_scan(c: &mut Criterion) {
  let bars1 = generate_bars(250);
  let bars2 = generate_bars(250);
  let bars3 = generate_bars(250);
  let bars4 = generate_bars(250);

  let engine = EngineBuilder::new().with_all_defaults().build().unwrap();

  let instruments: Vec<(&str, &[CandleStick])> =
    vec![
      ("600000", bars1.as_slice()),
      ("600036", bars2.as_slice()),
      ("000001", bars3.as_slice()),
      ("300750", bars4.as_slice()),
    ];

  c.bench_function("parallel_scan_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(scan_parallel(black_box(&engine), black_box(instruments.clone())));
    })
  });
}

criterion_group!(
  benches,
  bench_single_detector,
  bench_all_patterns,
  bench_pivot_scan,
  bench_scan_history,
  bench_parallel_scan,
);

criterion_main!(benches);

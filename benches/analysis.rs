//! Benchmarks for pattern analysis.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use phipattern::prelude::*;

/// Deterministic walk with a golden run every 40 bars
fn generate_prices(n: usize) -> Vec<PricePoint> {
  let mut prices = Vec::with_capacity(n);
  let mut price = 100.0;
  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 2_500.0 - 0.02; // Deterministic "random"
    price = if i % 40 < 3 { price * GOLDEN_RATIO } else { price * (1.0 + change) };
    if price > 1e6 {
      price = 100.0;
    }
    let volume = 1_000.0 + ((i * 3) % 10) as f64 * 50.0;
    prices.push(PricePoint::new(price, volume, i as i64 * 60_000));
  }
  prices
}

fn uncached() -> AnalysisConfig {
  AnalysisConfig::default().use_cache(false)
}

fn bench_ratios(c: &mut Criterion) {
  let prices = generate_prices(10_000);
  let calculator = RatioCalculator::default();

  c.bench_function("ratios_10000_points", |b| {
    b.iter(|| {
      let _ = black_box(calculator.compute(black_box(&prices)));
    })
  });
}

fn bench_backends(c: &mut Criterion) {
  let params = DetectionParams::default();
  let parallel = ParallelBackend::new(0).unwrap();
  let mut group = c.benchmark_group("backend");

  for size in [1_000, 10_000, 100_000].iter() {
    let prices = generate_prices(*size);
    group.bench_with_input(BenchmarkId::new("sequential", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(SequentialBackend.compute(black_box(&prices), &params));
      })
    });
    group.bench_with_input(BenchmarkId::new("rayon", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(parallel.compute(black_box(&prices), &params));
      })
    });
  }
  group.finish();
}

fn bench_full_analysis(c: &mut Criterion) {
  let analyzer = AnalyzerBuilder::new().build().unwrap();
  let mut group = c.benchmark_group("analyze");

  for size in [500, 5_000].iter() {
    let prices = generate_prices(*size);
    group.bench_with_input(BenchmarkId::new("uncached", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(analyzer.analyze(black_box(&prices), &uncached()));
      })
    });
  }
  group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
  let cache = Arc::new(ResultCache::new(64, COLD_TTL));
  let analyzer = AnalyzerBuilder::new().cache(cache).build().unwrap();
  let prices = generate_prices(5_000);
  let config = AnalysisConfig::default();
  let _ = analyzer.analyze(&prices, &config);

  c.bench_function("analyze_cache_hit_5000_points", |b| {
    b.iter(|| {
      let _ = black_box(analyzer.analyze(black_box(&prices), &config));
    })
  });
}

fn bench_parallel_instruments(c: &mut Criterion) {
  let series: Vec<Vec<PricePoint>> = (0..4).map(|_| generate_prices(2_000)).collect();
  let analyzer = AnalyzerBuilder::new().parallel(false).build().unwrap();
  let instruments: Vec<(&str, &[PricePoint])> = vec![
    ("SYM1", &series[0]),
    ("SYM2", &series[1]),
    ("SYM3", &series[2]),
    ("SYM4", &series[3]),
  ];

  c.bench_function("analyze_parallel_4_instruments", |b| {
    b.iter(|| {
      let _ = black_box(analyze_parallel(
        black_box(&analyzer),
        black_box(instruments.clone()),
        &uncached(),
      ));
    })
  });
}

criterion_group!(
  benches,
  bench_ratios,
  bench_backends,
  bench_full_analysis,
  bench_cache_hit,
  bench_parallel_instruments,
);
criterion_main!(benches);

//! Benchmarks for the change-point scanner.
//!
//! Run:
//! - cargo bench --bench pelt_scan

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use speleo_scanner::changepoint::{ChangePointScanner, Pelt};

const LENGTHS: [usize; 4] = [100, 500, 2_000, 8_000];

/// Noisy piecewise-constant signal with a level shift every 250 samples
fn make_signal(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            let level = if (i / 250) % 2 == 0 { -1.0 } else { 1.0 };
            level + rng.gen_range(-0.5..0.5)
        })
        .collect()
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("pelt_detect");
    group.sample_size(20);

    let pelt = Pelt::new(3.0, 5).unwrap();
    for &len in &LENGTHS {
        let signal = make_signal(len, 7);
        group.bench_with_input(BenchmarkId::new("len", len), &signal, |b, signal| {
            b.iter(|| pelt.detect(black_box(signal)).unwrap());
        });
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner_scan");
    group.sample_size(20);

    let scanner = ChangePointScanner::new(3.0, 5);
    for &len in &LENGTHS {
        let years: Vec<f64> = (0..len).map(|i| 500.0 + 2.5 * i as f64).collect();
        let mut z: Vec<Option<f64>> = make_signal(len, 11).into_iter().map(Some).collect();
        // Sparse gaps to exercise interpolation
        for i in (17..len).step_by(97) {
            z[i] = None;
        }
        group.bench_with_input(BenchmarkId::new("len", len), &(years, z), |b, (years, z)| {
            b.iter(|| scanner.scan(black_box(years), black_box(z)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detect, bench_scan);
criterion_main!(benches);

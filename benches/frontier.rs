use std::hint::black_box;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use markowitz_rs::portfolio::AssetStatistics;
use markowitz_rs::portfolio::SolverBackend;
use markowitz_rs::portfolio::compute_frontier_curve;
use markowitz_rs::portfolio::sample_random_portfolios;
use markowitz_rs::portfolio::solve_optimal_portfolios;
use ndarray::Array1;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use rand_distr::Uniform;

/// Single-factor covariance `ββᵀσ_m² + diag(σ_ε²)` with random loadings.
fn factor_statistics(n: usize, seed: u64) -> AssetStatistics {
  let mut rng = StdRng::seed_from_u64(seed);
  let beta = Normal::new(1.0, 0.3).unwrap();
  let idio = Uniform::new(0.1, 0.3).unwrap();
  let drift = Uniform::new(0.02, 0.18).unwrap();

  let b: Vec<f64> = (0..n).map(|_| beta.sample(&mut rng)).collect();
  let e: Vec<f64> = (0..n).map(|_| idio.sample(&mut rng)).collect();
  let cov = Array2::from_shape_fn((n, n), |(i, j)| {
    let systematic = b[i] * b[j] * 0.18 * 0.18;
    if i == j {
      systematic + e[i] * e[i]
    } else {
      systematic
    }
  });
  let mu = Array1::from_shape_fn(n, |_| drift.sample(&mut rng));
  let tickers = (0..n).map(|i| format!("A{i}")).collect();

  AssetStatistics::new(tickers, mu, cov).unwrap()
}

fn bench_optimal_portfolios(c: &mut Criterion) {
  let mut group = c.benchmark_group("OptimalPortfolios");
  let solver = SolverBackend::default();

  for &n in &[5, 20, 50] {
    let stats = factor_statistics(n, 7);
    group.bench_with_input(BenchmarkId::new("augmented_lagrangian", n), &n, |b, _| {
      b.iter(|| black_box(solve_optimal_portfolios(&stats, 0.02, &solver)))
    });
  }

  group.finish();
}

fn bench_frontier(c: &mut Criterion) {
  let mut group = c.benchmark_group("Frontier");
  group.sample_size(10);
  let solver = SolverBackend::default();
  let stats = factor_statistics(20, 11);

  group.bench_function("sequential", |b| {
    b.iter(|| black_box(compute_frontier_curve(&stats, 50, &solver, false)))
  });

  group.bench_function("parallel", |b| {
    b.iter(|| black_box(compute_frontier_curve(&stats, 50, &solver, true)))
  });

  group.finish();
}

fn bench_monte_carlo(c: &mut Criterion) {
  let mut group = c.benchmark_group("MonteCarlo");
  let stats = factor_statistics(20, 3);

  group.bench_function("5000_portfolios", |b| {
    let mut rng = StdRng::seed_from_u64(0);
    b.iter(|| black_box(sample_random_portfolios(&stats, 0.02, 5000, &mut rng)))
  });

  group.finish();
}

criterion_group!(
  benches,
  bench_optimal_portfolios,
  bench_frontier,
  bench_monte_carlo
);
criterion_main!(benches);

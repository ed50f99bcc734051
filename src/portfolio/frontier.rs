//! # Efficient Frontier
//!
//! $$
//! \sigma^\*(r)=\min_{\mathbf{w}\in\Delta}\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}
//! \quad\text{s.t.}\quad \mu^\top\mathbf{w}=r,\qquad
//! r\in[\mu_{\text{mv}},\ \max_i\mu_i]
//! $$
//!
//! Frontier curve by target-return sweeps, Monte Carlo portfolio clouds and
//! the capital allocation line.

use rand::Rng;
use rayon::prelude::*;
use tracing::debug;
use tracing::warn;

use super::data::AssetStatistics;
use super::optimizers::solve_min_volatility;
use super::optimizers::solve_target_return;
use super::performance::PortfolioPoint;
use super::performance::portfolio_performance;
use super::performance::sharpe_ratio;
use super::solver::ConstrainedSolver;

/// `num_points` evenly spaced targets from `r_min` to `r_max`, both exact.
///
/// `r_min` is clamped to `r_max` when it exceeds it.
pub fn target_returns(r_min: f64, r_max: f64, num_points: usize) -> Vec<f64> {
  let start = r_min.min(r_max);
  match num_points {
    0 => Vec::new(),
    1 => vec![start],
    n => {
      let step = (r_max - start) / (n - 1) as f64;
      (0..n)
        .map(|i| {
          if i == n - 1 {
            r_max
          } else {
            (start + step * i as f64).min(r_max)
          }
        })
        .collect()
    }
  }
}

/// One target of the frontier sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontierPoint {
  /// Expected return the solve was constrained to.
  pub target_return: f64,
  /// Minimum volatility reaching the target; `None` when the solve failed.
  pub volatility: Option<f64>,
  /// Weights of the minimum-volatility portfolio at this target.
  pub weights: Option<Vec<f64>>,
}

impl FrontierPoint {
  pub fn is_gap(&self) -> bool {
    self.volatility.is_none()
  }
}

/// Efficient frontier between the minimum-volatility return and the best
/// single-asset return.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontierCurve {
  pub min_volatility_return: f64,
  pub max_return: f64,
  pub points: Vec<FrontierPoint>,
}

impl FrontierCurve {
  /// `(volatility, target_return)` pairs of the converged points.
  pub fn coordinates(&self) -> Vec<(f64, f64)> {
    self
      .points
      .iter()
      .filter_map(|p| p.volatility.map(|v| (v, p.target_return)))
      .collect()
  }

  pub fn gaps(&self) -> usize {
    self.points.iter().filter(|p| p.is_gap()).count()
  }
}

/// Lazy frontier sweep; each `next` runs one target-return solve.
pub struct FrontierIter<'a, S> {
  stats: &'a AssetStatistics,
  solver: &'a S,
  min_volatility_return: f64,
  max_return: f64,
  targets: std::vec::IntoIter<f64>,
}

impl<S> FrontierIter<'_, S> {
  pub fn min_volatility_return(&self) -> f64 {
    self.min_volatility_return
  }

  pub fn max_return(&self) -> f64 {
    self.max_return
  }
}

impl<S: ConstrainedSolver> Iterator for FrontierIter<'_, S> {
  type Item = FrontierPoint;

  fn next(&mut self) -> Option<Self::Item> {
    let target = self.targets.next()?;
    Some(frontier_point(self.stats, target, self.solver))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.targets.size_hint()
  }
}

impl<S: ConstrainedSolver> ExactSizeIterator for FrontierIter<'_, S> {}

/// Anchor the sweep at the minimum-volatility return and yield frontier
/// points on demand.
pub fn frontier_iter<'a, S: ConstrainedSolver>(
  stats: &'a AssetStatistics,
  num_points: usize,
  solver: &'a S,
) -> FrontierIter<'a, S> {
  let anchor = solve_min_volatility(stats, solver);
  if !anchor.converged() {
    warn!(status = ?anchor.status, "minimum-volatility anchor did not converge");
  }

  let (min_volatility_return, _) =
    portfolio_performance(&anchor.weights, stats.mean_returns(), stats.covariance());
  let max_return = stats.max_return();

  FrontierIter {
    stats,
    solver,
    min_volatility_return,
    max_return,
    targets: target_returns(min_volatility_return, max_return, num_points).into_iter(),
  }
}

fn frontier_point<S: ConstrainedSolver>(
  stats: &AssetStatistics,
  target_return: f64,
  solver: &S,
) -> FrontierPoint {
  let result = solve_target_return(stats, target_return, solver);
  if result.converged() {
    FrontierPoint {
      target_return,
      volatility: Some(result.objective.max(0.0).sqrt()),
      weights: Some(result.weights),
    }
  } else {
    debug!(target_return, status = ?result.status, "frontier point skipped");
    FrontierPoint {
      target_return,
      volatility: None,
      weights: None,
    }
  }
}

/// Solve every frontier target, fanning out over rayon when `parallel`.
///
/// Points come back in target order either way.
pub fn compute_frontier_curve<S: ConstrainedSolver + Sync>(
  stats: &AssetStatistics,
  num_points: usize,
  solver: &S,
  parallel: bool,
) -> FrontierCurve {
  let sweep = frontier_iter(stats, num_points, solver);
  let min_volatility_return = sweep.min_volatility_return();
  let max_return = sweep.max_return();

  let points: Vec<FrontierPoint> = if parallel {
    sweep
      .targets
      .as_slice()
      .par_iter()
      .map(|&target| frontier_point(stats, target, solver))
      .collect()
  } else {
    sweep.collect()
  };

  let curve = FrontierCurve {
    min_volatility_return,
    max_return,
    points,
  };
  debug!(
    points = curve.points.len(),
    gaps = curve.gaps(),
    "efficient frontier computed"
  );
  curve
}

/// A randomly weighted long-only portfolio.
#[derive(Clone, Debug, PartialEq)]
pub struct RandomPortfolio {
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Model expected portfolio return.
  pub expected_return: f64,
  /// Sharpe ratio with the volatility floored.
  pub sharpe: f64,
  /// Normalized random weights, in ticker order.
  pub weights: Vec<f64>,
}

/// Sample `num_samples` portfolios with uniform draws normalized to sum to one.
///
/// This is not uniform over the simplex; the cloud is illustrative only.
pub fn sample_random_portfolios<R: Rng + ?Sized>(
  stats: &AssetStatistics,
  risk_free: f64,
  num_samples: usize,
  rng: &mut R,
) -> Vec<RandomPortfolio> {
  let n = stats.len();
  (0..num_samples)
    .map(|_| {
      let mut weights: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
      let total: f64 = weights.iter().sum();
      if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
      } else {
        weights.fill(1.0 / n as f64);
      }

      let (expected_return, volatility) =
        portfolio_performance(&weights, stats.mean_returns(), stats.covariance());
      RandomPortfolio {
        volatility,
        expected_return,
        sharpe: sharpe_ratio(expected_return, volatility, risk_free),
        weights,
      }
    })
    .collect()
}

/// Line from the risk-free asset through a tangency portfolio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapitalAllocationLine {
  pub risk_free: f64,
  /// Sharpe ratio of the tangency portfolio.
  pub slope: f64,
}

impl CapitalAllocationLine {
  pub fn from_portfolio(tangency: &PortfolioPoint, risk_free: f64) -> Self {
    Self {
      risk_free,
      slope: sharpe_ratio(tangency.expected_return, tangency.volatility, risk_free),
    }
  }

  pub fn expected_return_at(&self, volatility: f64) -> f64 {
    self.risk_free + self.slope * volatility
  }

  /// `(volatility, return)` endpoints from zero risk to `extension` times the
  /// tangency volatility.
  pub fn endpoints(&self, tangency_volatility: f64, extension: f64) -> [(f64, f64); 2] {
    let far = tangency_volatility * extension;
    [(0.0, self.risk_free), (far, self.expected_return_at(far))]
  }
}

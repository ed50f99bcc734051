//! # Portfolio Optimizers
//!
//! $$
//! \max_{\mathbf{w}\in\Delta}\ \frac{\mu^\top\mathbf{w}-r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! \qquad
//! \min_{\mathbf{w}\in\Delta}\ \mathbf{w}^\top\Sigma\mathbf{w}
//! $$
//!
//! Maximum-Sharpe and minimum-volatility portfolios on the long-only simplex.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::data::AssetStatistics;
use super::error::Result;
use super::performance::VOLATILITY_FLOOR;
use super::performance::portfolio_performance;
use super::performance::portfolio_variance;
use super::performance::sharpe_ratio;
use super::solver::ConstrainedProblem;
use super::solver::ConstrainedSolver;
use super::solver::LinearConstraint;
use super::types::OptimalPortfolios;
use super::types::OptimizationResult;
use super::types::PortfolioResult;

/// Portfolio variance `wᵀΣw`.
#[derive(Clone, Copy, Debug)]
pub struct PortfolioVariance<'a> {
  pub cov: &'a Array2<f64>,
}

impl CostFunction for PortfolioVariance<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(portfolio_variance(w, self.cov))
  }
}

impl Gradient for PortfolioVariance<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let sigma_w = self.cov.dot(&ArrayView1::from(w.as_slice()));
    Ok(sigma_w.iter().map(|v| 2.0 * v).collect())
  }
}

/// Negated Sharpe ratio, volatility floored at [`VOLATILITY_FLOOR`].
#[derive(Clone, Copy, Debug)]
pub struct NegativeSharpe<'a> {
  pub mean_returns: &'a Array1<f64>,
  pub cov: &'a Array2<f64>,
  pub risk_free: f64,
}

impl CostFunction for NegativeSharpe<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let (expected_return, volatility) = portfolio_performance(w, self.mean_returns, self.cov);
    Ok(-sharpe_ratio(expected_return, volatility, self.risk_free))
  }
}

impl Gradient for NegativeSharpe<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let wv = ArrayView1::from(w.as_slice());
    let sigma_w = self.cov.dot(&wv);
    let raw_vol = wv.dot(&sigma_w).max(0.0).sqrt();
    let vol = raw_vol.max(VOLATILITY_FLOOR);
    let excess = wv.dot(self.mean_returns) - self.risk_free;
    // The floored volatility is locally constant.
    let dvol = if raw_vol > VOLATILITY_FLOOR { 1.0 / vol } else { 0.0 };

    Ok(
      self
        .mean_returns
        .iter()
        .zip(sigma_w.iter())
        .map(|(mu, sw)| -(mu / vol - excess * sw * dvol / (vol * vol)))
        .collect(),
    )
  }
}

/// Global minimum-variance weights.
pub fn solve_min_volatility<S: ConstrainedSolver>(
  stats: &AssetStatistics,
  solver: &S,
) -> OptimizationResult {
  let objective = PortfolioVariance {
    cov: stats.covariance(),
  };
  solver.minimize(&ConstrainedProblem::new(&objective, stats.len()))
}

/// Tangency (maximum Sharpe ratio) weights.
pub fn solve_max_sharpe<S: ConstrainedSolver>(
  stats: &AssetStatistics,
  risk_free: f64,
  solver: &S,
) -> OptimizationResult {
  let objective = NegativeSharpe {
    mean_returns: stats.mean_returns(),
    cov: stats.covariance(),
    risk_free,
  };
  solver.minimize(&ConstrainedProblem::new(&objective, stats.len()))
}

/// Minimum-variance weights achieving `target_return` exactly.
pub fn solve_target_return<S: ConstrainedSolver>(
  stats: &AssetStatistics,
  target_return: f64,
  solver: &S,
) -> OptimizationResult {
  let objective = PortfolioVariance {
    cov: stats.covariance(),
  };
  let problem = ConstrainedProblem::new(&objective, stats.len()).with_equality(
    LinearConstraint::new(stats.mean_returns().to_vec(), target_return),
  );
  solver.minimize(&problem)
}

/// Max-Sharpe and Min-Volatility portfolios with their performance.
///
/// Unconverged solves are still returned, flagged through
/// [`PortfolioResult::converged`].
pub fn solve_optimal_portfolios<S: ConstrainedSolver>(
  stats: &AssetStatistics,
  risk_free: f64,
  solver: &S,
) -> Result<OptimalPortfolios> {
  let max_sharpe = solve_max_sharpe(stats, risk_free, solver);
  let min_volatility = solve_min_volatility(stats, solver);

  Ok(OptimalPortfolios {
    max_sharpe: PortfolioResult::from_optimization(&max_sharpe, stats, risk_free)?,
    min_volatility: PortfolioResult::from_optimization(&min_volatility, stats, risk_free)?,
  })
}

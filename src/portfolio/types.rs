//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared result containers for solver output and optimal portfolios.

use super::data::AssetStatistics;
use super::error::PortfolioError;
use super::error::Result;
use super::performance::PortfolioPoint;

/// Termination state of a constrained solve.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverStatus {
  /// Constraints satisfied within tolerance at a stationary point.
  Converged,
  /// Iteration budget exhausted before the tolerance was met.
  MaxIterationsReached,
  /// The solve could not run (malformed problem or objective error).
  Failed(String),
}

/// Output of a constrained minimization.
///
/// The weights are returned even when the solve did not converge; check
/// [`OptimizationResult::converged`] before trusting them.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationResult {
  /// Best weight vector found.
  pub weights: Vec<f64>,
  /// Objective value at `weights`.
  pub objective: f64,
  /// How the solve ended.
  pub status: SolverStatus,
  /// Iterations spent (inner iterations for iterative backends).
  pub iterations: usize,
  /// Largest absolute equality-constraint residual at `weights`.
  pub constraint_violation: f64,
}

impl OptimizationResult {
  pub(crate) fn failed(weights: Vec<f64>, reason: impl Into<String>) -> Self {
    Self {
      weights,
      objective: f64::NAN,
      status: SolverStatus::Failed(reason.into()),
      iterations: 0,
      constraint_violation: f64::NAN,
    }
  }

  pub fn converged(&self) -> bool {
    self.status == SolverStatus::Converged
  }

  /// Surface non-convergence as [`PortfolioError::NonConvergence`].
  pub fn ensure_converged(self) -> Result<Self> {
    if self.converged() {
      Ok(self)
    } else {
      Err(PortfolioError::NonConvergence {
        iterations: self.iterations,
        violation: self.constraint_violation,
      })
    }
  }
}

/// Optimal portfolio handed to consumers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioResult {
  /// Final portfolio weights, in ticker order.
  pub weights: Vec<f64>,
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
  /// Objective value reported by the solver.
  pub objective: f64,
  /// Whether the solver met its tolerance.
  pub converged: bool,
}

impl PortfolioResult {
  pub(crate) fn from_optimization(
    result: &OptimizationResult,
    stats: &AssetStatistics,
    risk_free: f64,
  ) -> Result<Self> {
    let point = PortfolioPoint::from_weights(&result.weights, stats, risk_free)?;
    Ok(Self {
      weights: result.weights.clone(),
      expected_return: point.expected_return,
      volatility: point.volatility,
      sharpe: point.sharpe,
      objective: result.objective,
      converged: result.converged(),
    })
  }

  /// Risk/return coordinates.
  pub fn point(&self) -> PortfolioPoint {
    PortfolioPoint {
      volatility: self.volatility,
      expected_return: self.expected_return,
      sharpe: self.sharpe,
    }
  }

  /// Ticker/weight pairs strictly above `threshold`, in ticker order.
  pub fn significant_weights<'a>(
    &self,
    tickers: &'a [String],
    threshold: f64,
  ) -> Vec<(&'a str, f64)> {
    tickers
      .iter()
      .zip(self.weights.iter())
      .filter(|(_, w)| **w > threshold)
      .map(|(t, &w)| (t.as_str(), w))
      .collect()
  }
}

/// The two discrete optimal portfolios of a mean-variance analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimalPortfolios {
  /// Tangency portfolio.
  pub max_sharpe: PortfolioResult,
  /// Global minimum-variance portfolio.
  pub min_volatility: PortfolioResult,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unconverged_result_surfaces_error() {
    let result = OptimizationResult {
      weights: vec![0.5, 0.5],
      objective: 0.1,
      status: SolverStatus::MaxIterationsReached,
      iterations: 42,
      constraint_violation: 1e-3,
    };

    assert!(!result.converged());
    assert_eq!(
      result.ensure_converged(),
      Err(PortfolioError::NonConvergence {
        iterations: 42,
        violation: 1e-3
      })
    );
  }

  #[test]
  fn significant_weights_filter_small_allocations() {
    let tickers = vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()];
    let result = PortfolioResult {
      weights: vec![0.6, 0.005, 0.395],
      ..Default::default()
    };

    assert_eq!(
      result.significant_weights(&tickers, 0.01),
      vec![("AAPL", 0.6), ("NVDA", 0.395)]
    );
  }
}

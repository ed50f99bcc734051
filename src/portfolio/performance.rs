//! # Portfolio Performance
//!
//! $$
//! \mu_p = \mathbf{w}^\top\mu,\qquad
//! \sigma_p = \sqrt{\max(\mathbf{w}^\top \Sigma \mathbf{w}, 0)},\qquad
//! S = \frac{\mu_p - r_f}{\sigma_p}
//! $$
//!
//! Pure evaluation of expected return, volatility and Sharpe ratio.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::data::AssetStatistics;
use super::error::PortfolioError;
use super::error::Result;

/// Smallest volatility used as a Sharpe ratio denominator.
pub const VOLATILITY_FLOOR: f64 = 1e-10;

/// Portfolio variance `wᵀΣw`, clamped at zero.
pub fn portfolio_variance(weights: &[f64], cov: &Array2<f64>) -> f64 {
  let w = ArrayView1::from(weights);
  w.dot(&cov.dot(&w)).max(0.0)
}

/// Expected return and volatility of a weight vector.
pub fn portfolio_performance(
  weights: &[f64],
  mean_returns: &Array1<f64>,
  cov: &Array2<f64>,
) -> (f64, f64) {
  let expected_return = ArrayView1::from(weights).dot(mean_returns);
  let volatility = portfolio_variance(weights, cov).sqrt();
  (expected_return, volatility)
}

/// Sharpe ratio with the volatility floored at [`VOLATILITY_FLOOR`].
pub fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free: f64) -> f64 {
  (expected_return - risk_free) / volatility.max(VOLATILITY_FLOOR)
}

/// Sharpe ratio that refuses a zero denominator.
pub fn checked_sharpe_ratio(expected_return: f64, volatility: f64, risk_free: f64) -> Result<f64> {
  if volatility < VOLATILITY_FLOOR {
    return Err(PortfolioError::DegenerateSolution);
  }
  Ok((expected_return - risk_free) / volatility)
}

/// Risk/return coordinates of a portfolio.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioPoint {
  /// Annualized volatility.
  pub volatility: f64,
  /// Annualized expected return.
  pub expected_return: f64,
  /// `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

impl PortfolioPoint {
  /// Evaluate `weights` against `stats`.
  pub fn from_weights(weights: &[f64], stats: &AssetStatistics, risk_free: f64) -> Result<Self> {
    if weights.len() != stats.len() {
      return Err(PortfolioError::DimensionMismatch {
        expected: stats.len(),
        actual: weights.len(),
      });
    }

    let (expected_return, volatility) =
      portfolio_performance(weights, stats.mean_returns(), stats.covariance());
    Ok(Self {
      volatility,
      expected_return,
      sharpe: sharpe_ratio(expected_return, volatility, risk_free),
    })
  }
}

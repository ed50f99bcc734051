//! # Portfolio Errors
//!
//! $$
//! \text{error} : \text{analysis request} \to \{\text{data},\ \text{solver},\ \text{degenerate}\}
//! $$
//!
//! Error type shared by the portfolio pipeline.

use thiserror::Error;

/// Failure modes of the statistics and optimization pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortfolioError {
  /// Not enough usable observations to estimate statistics.
  #[error("insufficient data: {observations} usable observations, at least {required} required")]
  InsufficientData { observations: usize, required: usize },
  /// A constrained solve missed its tolerance within the iteration budget.
  #[error("optimization did not converge after {iterations} iterations (constraint violation {violation:.3e})")]
  NonConvergence { iterations: usize, violation: f64 },
  /// Zero volatility in a Sharpe ratio denominator.
  #[error("degenerate portfolio: volatility is zero, Sharpe ratio is undefined")]
  DegenerateSolution,
  /// Vector or matrix sizes disagree.
  #[error("dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
  /// Malformed price table, statistics or parameter.
  #[error("invalid input: {0}")]
  InvalidInput(String),
}

/// Convenience alias used throughout the portfolio module.
pub type Result<T> = std::result::Result<T, PortfolioError>;

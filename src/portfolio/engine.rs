//! # Portfolio Engine
//!
//! $$
//! P \xrightarrow{\ \text{stats}\ } (\mu,\Sigma) \xrightarrow{\ \text{optimize}\ }
//! \{\mathbf{w}_{\text{sharpe}},\ \mathbf{w}_{\text{mv}},\ \sigma^\*(r)\}
//! $$
//!
//! High-level orchestration API from price history to a full mean-variance
//! analysis.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use rand::Rng;
use tracing::info;
use tracing::instrument;

use super::data::AssetStatistics;
use super::data::PriceTable;
use super::data::TRADING_DAYS_PER_YEAR;
use super::data::compute_statistics;
use super::error::PortfolioError;
use super::error::Result;
use super::frontier::CapitalAllocationLine;
use super::frontier::FrontierCurve;
use super::frontier::RandomPortfolio;
use super::frontier::compute_frontier_curve;
use super::frontier::sample_random_portfolios;
use super::optimizers::solve_optimal_portfolios;
use super::solver::SolverBackend;
use super::types::OptimalPortfolios;

/// History window requested from a [`PriceSource`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LookbackPeriod {
  OneYear,
  TwoYears,
  #[default]
  FiveYears,
  TenYears,
  Max,
}

impl fmt::Display for LookbackPeriod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Self::OneYear => "1y",
      Self::TwoYears => "2y",
      Self::FiveYears => "5y",
      Self::TenYears => "10y",
      Self::Max => "max",
    };
    f.write_str(label)
  }
}

impl FromStr for LookbackPeriod {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "1y" => Ok(Self::OneYear),
      "2y" => Ok(Self::TwoYears),
      "5y" => Ok(Self::FiveYears),
      "10y" => Ok(Self::TenYears),
      "max" => Ok(Self::Max),
      other => Err(PortfolioError::InvalidInput(format!(
        "unknown lookback period {other}"
      ))),
    }
  }
}

/// Supplier of daily closing prices.
pub trait PriceSource {
  /// Aligned closing prices for `tickers`, oldest row first.
  fn fetch_prices(
    &self,
    tickers: &[String],
    lookback: LookbackPeriod,
  ) -> anyhow::Result<PriceTable>;
}

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioEngineConfig {
  /// Risk-free rate used in Sharpe computations.
  pub risk_free: f64,
  /// Return observations per year used for annualization.
  pub periods_per_year: f64,
  /// Target returns in the frontier sweep.
  pub frontier_points: usize,
  /// Monte Carlo portfolios sampled per analysis.
  pub random_portfolios: usize,
  /// Solve frontier targets on the rayon pool.
  pub parallel: bool,
  /// Constrained solver used for every optimization.
  pub solver: SolverBackend,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      risk_free: 0.02,
      periods_per_year: TRADING_DAYS_PER_YEAR,
      frontier_points: 100,
      random_portfolios: 5000,
      parallel: true,
      solver: SolverBackend::default(),
    }
  }
}

/// Everything a mean-variance report needs.
#[derive(Clone, Debug)]
pub struct PortfolioAnalysis {
  pub statistics: AssetStatistics,
  pub optimal: OptimalPortfolios,
  pub frontier: FrontierCurve,
  pub random_portfolios: Vec<RandomPortfolio>,
  /// Line through the risk-free rate and the Max-Sharpe portfolio.
  pub capital_allocation_line: CapitalAllocationLine,
}

/// Single entry-point engine for mean-variance workflows.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Annualized mean returns and covariance of `prices`.
  pub fn statistics(&self, prices: &PriceTable) -> Result<AssetStatistics> {
    compute_statistics(prices, self.config.periods_per_year)
  }

  /// Max-Sharpe and Min-Volatility portfolios.
  pub fn optimize(&self, stats: &AssetStatistics) -> Result<OptimalPortfolios> {
    solve_optimal_portfolios(stats, self.config.risk_free, &self.config.solver)
  }

  /// Efficient frontier over the configured number of target returns.
  pub fn frontier(&self, stats: &AssetStatistics) -> FrontierCurve {
    compute_frontier_curve(
      stats,
      self.config.frontier_points,
      &self.config.solver,
      self.config.parallel,
    )
  }

  /// Monte Carlo portfolio cloud drawn from `rng`.
  pub fn sample_random<R: Rng + ?Sized>(
    &self,
    stats: &AssetStatistics,
    rng: &mut R,
  ) -> Vec<RandomPortfolio> {
    sample_random_portfolios(stats, self.config.risk_free, self.config.random_portfolios, rng)
  }

  /// Run the full pipeline on an already aligned price table.
  #[instrument(skip_all, fields(assets = prices.n_assets(), rows = prices.len()))]
  pub fn analyze<R: Rng + ?Sized>(
    &self,
    prices: &PriceTable,
    rng: &mut R,
  ) -> Result<PortfolioAnalysis> {
    let statistics = self.statistics(prices)?;
    let optimal = self.optimize(&statistics)?;
    let frontier = self.frontier(&statistics);
    let random_portfolios = self.sample_random(&statistics, rng);
    let capital_allocation_line =
      CapitalAllocationLine::from_portfolio(&optimal.max_sharpe.point(), self.config.risk_free);

    info!(
      max_sharpe = optimal.max_sharpe.sharpe,
      min_volatility = optimal.min_volatility.volatility,
      frontier_gaps = frontier.gaps(),
      "portfolio analysis complete"
    );

    Ok(PortfolioAnalysis {
      statistics,
      optimal,
      frontier,
      random_portfolios,
      capital_allocation_line,
    })
  }

  /// Fetch prices for `tickers` from `source` and analyze them.
  #[instrument(skip_all, fields(tickers = ?tickers, lookback = %lookback))]
  pub fn analyze_tickers<P: PriceSource + ?Sized, R: Rng + ?Sized>(
    &self,
    source: &P,
    tickers: &[String],
    lookback: LookbackPeriod,
    rng: &mut R,
  ) -> anyhow::Result<PortfolioAnalysis> {
    anyhow::ensure!(!tickers.is_empty(), "no tickers requested");

    let prices = source
      .fetch_prices(tickers, lookback)
      .with_context(|| format!("failed to fetch {lookback} prices for {tickers:?}"))?;
    let analysis = self
      .analyze(&prices, rng)
      .context("mean-variance analysis failed")?;
    Ok(analysis)
  }
}

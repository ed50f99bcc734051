//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Mean-variance statistics, constrained optimal portfolios and efficient
//! frontiers.

pub mod data;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod optimizers;
pub mod performance;
pub mod solver;
pub mod types;

pub use data::AssetStatistics;
pub use data::PriceTable;
pub use data::ReturnSeries;
pub use data::TRADING_DAYS_PER_YEAR;
pub use data::compute_statistics;
pub use engine::LookbackPeriod;
pub use engine::PortfolioAnalysis;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use engine::PriceSource;
pub use error::PortfolioError;
pub use frontier::CapitalAllocationLine;
pub use frontier::FrontierCurve;
pub use frontier::FrontierPoint;
pub use frontier::RandomPortfolio;
pub use frontier::compute_frontier_curve;
pub use frontier::frontier_iter;
pub use frontier::sample_random_portfolios;
pub use frontier::target_returns;
pub use optimizers::solve_max_sharpe;
pub use optimizers::solve_min_volatility;
pub use optimizers::solve_optimal_portfolios;
pub use optimizers::solve_target_return;
pub use performance::PortfolioPoint;
pub use performance::portfolio_performance;
pub use performance::sharpe_ratio;
pub use solver::AugmentedLagrangian;
pub use solver::ConstrainedSolver;
pub use solver::SoftmaxNelderMead;
pub use solver::SolverBackend;
pub use types::OptimalPortfolios;
pub use types::OptimizationResult;
pub use types::PortfolioResult;
pub use types::SolverStatus;

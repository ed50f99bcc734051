//! # markowitz-rs
//!
//! $$
//! \min_{\mathbf{w}\in\Delta^{N-1}} \mathbf{w}^\top \Sigma \mathbf{w}
//! \quad\text{s.t.}\quad \mu^\top \mathbf{w} = r^\*
//! $$
//!
//! Mean-variance portfolio statistics, constrained optimal portfolios and
//! efficient frontiers for long-only, fully invested allocations.

pub mod portfolio;

pub use portfolio::AssetStatistics;
pub use portfolio::PortfolioEngine;
pub use portfolio::PortfolioEngineConfig;
pub use portfolio::PortfolioError;
pub use portfolio::PriceTable;

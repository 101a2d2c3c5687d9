//! Folio - multi-asset portfolio backtesting and heuristic weight allocation.
//!
//! # Overview
//!
//! Folio answers two questions about a static list of tickers and weights:
//!
//! - **Backtest**: how would the portfolio have grown against a benchmark,
//!   with buy-and-hold drift and periodic rebalancing back to target weights?
//! - **Optimize**: what weights would a simple heuristic (mean-variance,
//!   minimum volatility, maximum Sharpe, risk parity or equal weight)
//!   suggest, and which tickers from a wider universe are worth adding?
//!
//! Price data comes from a [`data::PriceHistory`] collaborator. Everything
//! downstream is a pure computation over in-memory series.
//!
//! # Quick Start
//!
//! ```no_run
//! use folio::backtest::{run_backtest, AnalysisConfig, BacktestRequest};
//! use folio::data::CsvPriceSource;
//! use folio::types::RebalancePeriod;
//! use chrono::NaiveDate;
//!
//! let source = CsvPriceSource::new("data");
//! let request = BacktestRequest {
//!     tickers: vec!["SPY".into(), "AGG".into()],
//!     weights: vec![0.6, 0.4],
//!     benchmark: "SPY".into(),
//!     start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
//!     end_date: None,
//!     rebalance_period: RebalancePeriod::Quarterly,
//! };
//!
//! let report = run_backtest(&request, &source, &AnalysisConfig::default()).unwrap();
//! println!("CAGR: {:.2}%", report.portfolio_metrics.cagr * 100.0);
//! println!("Sharpe: {:.2}", report.portfolio_metrics.sharpe_ratio);
//! ```
//!
//! # Modules
//!
//! - [`types`]: Shared domain types and the ordered [`TickerMap`]
//! - [`align`]: Date alignment of irregular price series
//! - [`returns`]: Daily and cumulative returns
//! - [`simulator`]: Buy-and-hold simulation with rebalancing
//! - [`metrics`]: CAGR, volatility, Sharpe, Sortino, drawdown, alpha/beta
//! - [`rolling`]: Sliding-window return, volatility and Sharpe
//! - [`optimizer`]: Heuristic allocation models and suggestions
//! - [`analytics`]: Drawdown/period tables, correlations, report formatting
//! - [`backtest`]: Request orchestration
//! - [`data`]: Price-history sources (in-memory, CSV directory)
//! - [`config`]: TOML configuration file support

pub mod align;
pub mod analytics;
pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod returns;
pub mod rolling;
pub mod simulator;
pub mod types;

// Re-exports for convenience
pub use align::{align_series, AlignedTable};
pub use analytics::{
    asset_statistics, correlation_matrix, AssetStatistics, CorrelationMatrix, DrawdownPoint,
    PeriodReturn, ResultFormatter,
};
pub use backtest::{
    run_backtest, run_optimization, AnalysisConfig, BacktestReport, BacktestRequest,
    OptimizationReport, OptimizationRequest,
};
pub use data::{CsvPriceSource, InMemoryPrices, PriceHistory};
pub use error::{FolioError, Result};
pub use metrics::{MetricsConfig, MetricsEngine, VarianceDivisor};
pub use optimizer::{
    portfolio_statistics, AllocationModel, AllocationOptimizer, OptimizationInput,
    OptimizationResult, OptimizerConfig, PortfolioStatistics, Suggestion,
};
pub use returns::{cumulative_returns, daily_returns, MissingDataPolicy, ReturnTable};
pub use rolling::{RollingMetricsEngine, RollingPoint};
pub use simulator::{simulate, PortfolioSimulator, SimulationConfig, SimulationResult};
pub use types::{
    MetricsResult, OptimizationModel, PerformanceRecord, PricePoint, RebalancePeriod, SeriesKey,
    TickerMap,
};

//! Request orchestration.
//!
//! [`run_backtest`] and [`run_optimization`] take a request, pull price
//! history from a [`PriceHistory`] source, and drive the aligner, return
//! calculator, simulator, metrics engines and optimizer to produce a
//! serializable report.

use crate::align::{align_series, AlignedTable};
use crate::analytics::{
    asset_statistics, correlation_matrix, drawdown_series, period_table, AssetStatistics,
    CorrelationMatrix, DrawdownPoint, PeriodReturn,
};
use crate::data::PriceHistory;
use crate::error::{FolioError, Result};
use crate::metrics::{Granularity, MetricsConfig, MetricsEngine};
use crate::optimizer::{
    portfolio_statistics, AllocationOptimizer, OptimizationInput, OptimizerConfig,
    PortfolioStatistics, Suggestion,
};
use crate::returns::{cumulative_returns, daily_returns, MissingDataPolicy};
use crate::rolling::{RollingMetricsEngine, RollingPoint, DEFAULT_ROLLING_WINDOW};
use crate::simulator::{simulate, SimulationConfig};
use crate::types::{
    validate_weights, AllocationSnapshot, MetricsResult, OptimizationModel, PerformanceRecord,
    PricePoint, RebalancePeriod, SeriesKey, TickerMap,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Tunables shared by both request kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub metrics: MetricsConfig,
    pub rolling_window: usize,
    pub missing_data: MissingDataPolicy,
    pub optimizer: OptimizerConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            rolling_window: DEFAULT_ROLLING_WINDOW,
            missing_data: MissingDataPolicy::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// A portfolio backtest request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub tickers: Vec<String>,
    pub weights: Vec<f64>,
    pub benchmark: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub rebalance_period: RebalancePeriod,
}

/// A weight optimization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub tickers: Vec<String>,
    pub weights: Vec<f64>,
    pub model: OptimizationModel,
    /// Tickers that may be suggested as additions.
    #[serde(default)]
    pub universe: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// One cumulative-return observation of a single ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Everything produced by a backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub tickers: Vec<String>,
    pub weights: TickerMap<f64>,
    pub benchmark: String,
    pub rebalance_period: RebalancePeriod,
    pub performance: Vec<PerformanceRecord>,
    pub allocations: Vec<AllocationSnapshot>,
    pub rebalance_dates: Vec<NaiveDate>,
    pub drawdowns: Vec<DrawdownPoint>,
    pub yearly_returns: Vec<PeriodReturn>,
    pub monthly_returns: Vec<PeriodReturn>,
    pub rolling_portfolio: Vec<RollingPoint>,
    pub rolling_benchmark: Vec<RollingPoint>,
    pub portfolio_metrics: MetricsResult,
    pub benchmark_metrics: MetricsResult,
    /// Per-ticker cumulative growth of 1.0; dates without a value are omitted.
    pub cumulative_returns: TickerMap<Vec<CumulativePoint>>,
}

/// Current versus optimized allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub model: OptimizationModel,
    pub current_weights: TickerMap<f64>,
    pub optimized_weights: TickerMap<f64>,
    pub current_statistics: PortfolioStatistics,
    pub optimized_statistics: PortfolioStatistics,
    pub rationale: String,
    pub suggestions: Vec<Suggestion>,
    /// Statistics of every held and candidate ticker with data.
    pub asset_statistics: TickerMap<AssetStatistics>,
    pub correlations: CorrelationMatrix,
}

/// Ordered union of ticker lists without repeats.
fn unique_tickers<'a>(lists: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ticker in lists {
        if !out.contains(ticker) {
            out.push(ticker.clone());
        }
    }
    out
}

fn check_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(FolioError::InvalidInput(format!(
                "end date {} is before start date {}",
                e, s
            )));
        }
    }
    Ok(())
}

fn build_table(
    series: &[(String, Vec<PricePoint>)],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> AlignedTable {
    let refs: Vec<(&str, &[PricePoint])> = series
        .iter()
        .map(|(t, points)| (t.as_str(), points.as_slice()))
        .collect();
    align_series(&refs).restrict(start, end)
}

/// Run a full backtest.
pub fn run_backtest(
    request: &BacktestRequest,
    source: &dyn PriceHistory,
    config: &AnalysisConfig,
) -> Result<BacktestReport> {
    validate_weights(&request.tickers, &request.weights)?;
    if request.benchmark.trim().is_empty() {
        return Err(FolioError::InvalidInput("benchmark ticker is empty".to_string()));
    }
    check_range(Some(request.start_date), request.end_date)?;
    let rolling = RollingMetricsEngine::new(config.rolling_window, config.metrics)?;

    info!(
        "Running backtest of {} tickers against {} from {}",
        request.tickers.len(),
        request.benchmark,
        request.start_date
    );

    let wanted = unique_tickers(request.tickers.iter().chain(std::iter::once(&request.benchmark)));
    let mut series = Vec::with_capacity(wanted.len());
    for ticker in wanted {
        let points = source.history(&ticker, Some(request.start_date), request.end_date)?;
        debug!("Fetched {} observations for {}", points.len(), ticker);
        series.push((ticker, points));
    }
    let table = build_table(&series, Some(request.start_date), request.end_date);

    let sim_config = SimulationConfig {
        tickers: request.tickers.clone(),
        weights: request.weights.clone(),
        benchmark: request.benchmark.clone(),
        rebalance: request.rebalance_period,
    };
    let simulation = simulate(&table, &sim_config)?;
    let performance = simulation.performance;

    let engine = MetricsEngine::new(config.metrics);
    let portfolio_metrics = engine.compute(&performance, SeriesKey::Portfolio);
    let benchmark_metrics = engine.compute(&performance, SeriesKey::Benchmark);

    let daily = daily_returns(&table);
    let cumulative = cumulative_returns(&table, &daily, config.missing_data);
    let cumulative_returns = request
        .tickers
        .iter()
        .map(|ticker| {
            let points = match cumulative.column(ticker) {
                Some(column) => cumulative
                    .rows
                    .iter()
                    .filter_map(|row| {
                        row.value(column).map(|value| CumulativePoint {
                            date: row.date,
                            value,
                        })
                    })
                    .collect(),
                None => Vec::new(),
            };
            (ticker.clone(), points)
        })
        .collect();

    let report = BacktestReport {
        tickers: request.tickers.clone(),
        weights: TickerMap::from_weights(&request.tickers, &request.weights),
        benchmark: request.benchmark.clone(),
        rebalance_period: request.rebalance_period,
        drawdowns: drawdown_series(&performance),
        yearly_returns: period_table(&performance, Granularity::Year),
        monthly_returns: period_table(&performance, Granularity::Month),
        rolling_portfolio: rolling.compute(&performance, SeriesKey::Portfolio),
        rolling_benchmark: rolling.compute(&performance, SeriesKey::Benchmark),
        allocations: simulation.allocations,
        rebalance_dates: simulation.rebalance_dates,
        portfolio_metrics,
        benchmark_metrics,
        cumulative_returns,
        performance,
    };

    info!(
        "Backtest complete: {} days, CAGR {:.2}%, Sharpe {:.2}",
        report.performance.len(),
        report.portfolio_metrics.cagr * 100.0,
        report.portfolio_metrics.sharpe_ratio
    );

    Ok(report)
}

/// Optimize the weights of an existing allocation.
///
/// Held tickers must all have data; universe tickers without data are
/// skipped.
pub fn run_optimization(
    request: &OptimizationRequest,
    source: &dyn PriceHistory,
    config: &AnalysisConfig,
) -> Result<OptimizationReport> {
    validate_weights(&request.tickers, &request.weights)?;
    check_range(request.start_date, request.end_date)?;
    config.optimizer.validate()?;

    info!(
        "Optimizing {} tickers with {} model",
        request.tickers.len(),
        request.model
    );

    let universe = request.universe.as_deref().unwrap_or(&[]);
    let mut series = Vec::new();
    for ticker in unique_tickers(&request.tickers) {
        let points = source.history(&ticker, request.start_date, request.end_date)?;
        series.push((ticker, points));
    }
    for ticker in unique_tickers(universe) {
        if request.tickers.contains(&ticker) {
            continue;
        }
        match source.history(&ticker, request.start_date, request.end_date) {
            Ok(points) if !points.is_empty() => series.push((ticker, points)),
            Ok(_) => warn!("No price history for candidate {}, skipping", ticker),
            Err(e) => warn!("Could not load candidate {}: {}", ticker, e),
        }
    }

    let table = build_table(&series, request.start_date, request.end_date);
    if let Some(missing) = request.tickers.iter().find(|t| table.observations(t) == 0) {
        return Err(FolioError::MissingTicker(missing.clone()));
    }
    if table.len() < 2 {
        return Err(FolioError::InsufficientData(format!(
            "{} aligned dates, need at least 2",
            table.len()
        )));
    }

    let returns = daily_returns(&table);
    let mut statistics = TickerMap::with_capacity(table.tickers().len());
    for ticker in table.tickers() {
        if table.observations(ticker) == 0 {
            continue;
        }
        let stats = asset_statistics(&table, ticker, &config.metrics)?;
        statistics.insert(ticker.clone(), stats);
    }
    let present: Vec<String> = statistics.tickers().map(str::to_string).collect();
    let correlations = correlation_matrix(&returns, &present, config.metrics.variance);

    let optimizer = AllocationOptimizer::new(config.optimizer.clone());
    let input = OptimizationInput {
        tickers: &request.tickers,
        weights: &request.weights,
        statistics: &statistics,
        correlations: &correlations,
        universe,
    };
    let result = optimizer.optimize(request.model, &input)?;

    let optimized: Vec<f64> = result.weights.values().copied().collect();
    let current_statistics =
        portfolio_statistics(&request.tickers, &request.weights, &statistics, &correlations)?;
    let optimized_statistics =
        portfolio_statistics(&request.tickers, &optimized, &statistics, &correlations)?;

    debug!(
        "Optimized Sharpe {:.2} -> {:.2}",
        current_statistics.sharpe_ratio, optimized_statistics.sharpe_ratio
    );

    Ok(OptimizationReport {
        model: request.model,
        current_weights: TickerMap::from_weights(&request.tickers, &request.weights),
        optimized_weights: result.weights,
        current_statistics,
        optimized_statistics,
        rationale: result.rationale,
        suggestions: result.suggestions,
        asset_statistics: statistics,
        correlations,
    })
}

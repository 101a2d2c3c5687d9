//! Derived analytics and reporting.
//!
//! Drawdown and calendar-return tables for backtest reports, per-asset
//! statistics and correlation matrices for allocation requests, and the
//! terminal/JSON formatters used by the CLI.

use crate::align::AlignedTable;
use crate::backtest::{BacktestReport, OptimizationReport};
use crate::error::{FolioError, Result};
use crate::metrics::{
    annualized_volatility, calendar_returns, cagr, correlation, drawdowns, max_drawdown,
    period_returns, Granularity, MetricsConfig, VarianceDivisor,
};
use crate::returns::ReturnTable;
use crate::types::{finite_or_zero, MetricsResult, PerformanceRecord, SeriesKey};
use chrono::NaiveDate;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{builder::Builder, settings::Style};

/// Drawdown of both series on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    pub portfolio: f64,
    pub benchmark: f64,
}

/// Return of both series within one calendar period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturn {
    /// `YYYY` or `YYYY-MM`.
    pub period: String,
    pub portfolio: f64,
    pub benchmark: f64,
}

pub fn drawdown_series(performance: &[PerformanceRecord]) -> Vec<DrawdownPoint> {
    let portfolio: Vec<f64> = performance.iter().map(|r| r.portfolio).collect();
    let benchmark: Vec<f64> = performance.iter().map(|r| r.benchmark).collect();
    performance
        .iter()
        .zip(drawdowns(&portfolio).into_iter().zip(drawdowns(&benchmark)))
        .map(|(r, (p, b))| DrawdownPoint {
            date: r.date,
            portfolio: p,
            benchmark: b,
        })
        .collect()
}

/// Per-period returns of both series.
pub fn period_table(performance: &[PerformanceRecord], granularity: Granularity) -> Vec<PeriodReturn> {
    let dated = |key: SeriesKey| -> Vec<(NaiveDate, f64)> {
        performance.iter().map(|r| (r.date, r.value(key))).collect()
    };
    let portfolio = calendar_returns(&dated(SeriesKey::Portfolio), granularity);
    let benchmark = calendar_returns(&dated(SeriesKey::Benchmark), granularity);

    portfolio
        .into_iter()
        .zip(benchmark)
        .map(|((period, p), (_, b))| PeriodReturn {
            period,
            portfolio: p,
            benchmark: b,
        })
        .collect()
}

/// Static statistics of one instrument over the requested history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStatistics {
    pub ticker: String,
    pub annual_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

/// Compute [`AssetStatistics`] for one ticker of an aligned table.
///
/// Every figure comes from the ticker's own observations, so dates that
/// only other tickers trade on leave the result unchanged.
pub fn asset_statistics(
    table: &AlignedTable,
    ticker: &str,
    config: &MetricsConfig,
) -> Result<AssetStatistics> {
    let prices: Vec<f64> = table.series(ticker).iter().map(|p| p.price).collect();
    let (Some(&first), Some(&last)) = (prices.first(), prices.last()) else {
        return Err(FolioError::MissingTicker(ticker.to_string()));
    };

    let annual_return = cagr(first, last, prices.len(), config.trading_days_per_year);
    let volatility = annualized_volatility(&period_returns(&prices), config);
    let sharpe_ratio = if volatility > 0.0 {
        finite_or_zero((annual_return - config.risk_free_rate) / volatility)
    } else {
        0.0
    };

    Ok(AssetStatistics {
        ticker: ticker.to_string(),
        annual_return,
        volatility,
        sharpe_ratio,
        max_drawdown: max_drawdown(&prices),
    })
}

/// Symmetric pairwise correlation matrix with a unit diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Identity matrix over `tickers`.
    pub fn identity(tickers: &[String]) -> Self {
        let n = tickers.len();
        let values = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        Self {
            tickers: tickers.to_vec(),
            values,
        }
    }

    pub fn index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let (i, j) = (self.index(a)?, self.index(b)?);
        Some(self.values[i][j])
    }

    /// Correlation of a pair, 1 for a ticker with itself and 0 when unknown.
    pub fn get_or_default(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            self.get(a, b).unwrap_or(0.0)
        }
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let n = self.tickers.len();
        (0..n).all(|i| {
            (self.values[i][i] - 1.0).abs() <= tolerance
                && (0..n).all(|j| (self.values[i][j] - self.values[j][i]).abs() <= tolerance)
        })
    }
}

/// Pearson correlation of daily returns over the dates both tickers share.
pub fn correlation_matrix(
    returns: &ReturnTable,
    tickers: &[String],
    divisor: VarianceDivisor,
) -> CorrelationMatrix {
    let mut matrix = CorrelationMatrix::identity(tickers);
    let columns: Vec<Option<usize>> = tickers.iter().map(|t| returns.column(t)).collect();

    for i in 0..tickers.len() {
        for j in (i + 1)..tickers.len() {
            let (Some(ci), Some(cj)) = (columns[i], columns[j]) else {
                continue;
            };
            let (a, b): (Vec<f64>, Vec<f64>) = returns
                .rows
                .iter()
                .filter_map(|r| Some((r.value(ci)?, r.value(cj)?)))
                .unzip();
            let rho = correlation(&a, &b, divisor);
            matrix.values[i][j] = rho;
            matrix.values[j][i] = rho;
        }
    }

    matrix
}

/// Format results for terminal display.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print a backtest report to stdout.
    pub fn print_backtest_report(report: &BacktestReport) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " BACKTEST RESULTS ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!("  Tickers:         {}", report.tickers.join(", "));
        println!("  Benchmark:       {}", report.benchmark);
        if let (Some(first), Some(last)) = (report.performance.first(), report.performance.last()) {
            println!("  Period:          {} to {}", first.date, last.date);
            println!("  Trading Days:    {}", report.performance.len());
            println!(
                "  Final Value:     {:>12.4}  {}",
                last.portfolio,
                Self::format_pct_change((last.portfolio - 1.0) * 100.0)
            );
        }
        println!("  Rebalance:       {}", report.rebalance_period);
        println!("  Rebalances:      {}", report.rebalance_dates.len());
        println!();

        println!("{}", "Statistics".bold().underline());
        Self::print_metrics_table(&report.portfolio_metrics, &report.benchmark_metrics);
        println!();

        if !report.yearly_returns.is_empty() {
            println!("{}", "Yearly Returns".bold().underline());
            let mut builder = Builder::new();
            builder.push_record(["Year", "Portfolio", "Benchmark"]);
            for y in &report.yearly_returns {
                builder.push_record([
                    y.period.clone(),
                    format!("{:.2}%", y.portfolio * 100.0),
                    format!("{:.2}%", y.benchmark * 100.0),
                ]);
            }
            println!("{}", builder.build().with(Style::rounded()).to_string());
            println!();
        }

        println!("{}", "═".repeat(60).blue());
    }

    fn print_metrics_table(portfolio: &MetricsResult, benchmark: &MetricsResult) {
        let rows: [(&str, f64, f64, bool); 11] = [
            ("CAGR", portfolio.cagr, benchmark.cagr, true),
            ("Volatility", portfolio.volatility, benchmark.volatility, true),
            ("Sharpe Ratio", portfolio.sharpe_ratio, benchmark.sharpe_ratio, false),
            ("Sortino Ratio", portfolio.sortino, benchmark.sortino, false),
            ("Max Drawdown", portfolio.max_drawdown, benchmark.max_drawdown, true),
            ("Win Rate", portfolio.win_rate, benchmark.win_rate, true),
            ("Best Year", portfolio.best_year, benchmark.best_year, true),
            ("Worst Year", portfolio.worst_year, benchmark.worst_year, true),
            ("Alpha", portfolio.alpha, benchmark.alpha, true),
            ("Beta", portfolio.beta, benchmark.beta, false),
            (
                "Correlation",
                portfolio.correlation_to_benchmark,
                benchmark.correlation_to_benchmark,
                false,
            ),
        ];

        let mut builder = Builder::new();
        builder.push_record(["Metric", "Portfolio", "Benchmark"]);
        for (name, p, b, pct) in rows {
            let fmt = |v: f64| {
                if pct {
                    format!("{:.2}%", v * 100.0)
                } else {
                    format!("{:.2}", v)
                }
            };
            builder.push_record([name.to_string(), fmt(p), fmt(b)]);
        }
        println!("{}", builder.build().with(Style::rounded()).to_string());
    }

    /// Print an optimization report to stdout.
    pub fn print_optimization_report(report: &OptimizationReport) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!(
            "{}",
            format!(" OPTIMIZATION ({}) ", report.model).bold().blue()
        );
        println!("{}", "═".repeat(60).blue());
        println!();

        let mut builder = Builder::new();
        builder.push_record(["Ticker", "Current", "Optimized", "Change"]);
        for (ticker, current) in report.current_weights.iter() {
            let optimized = report.optimized_weights.get(ticker).copied().unwrap_or(0.0);
            builder.push_record([
                ticker.to_string(),
                format!("{:.2}%", current * 100.0),
                format!("{:.2}%", optimized * 100.0),
                format!("{:+.2}%", (optimized - current) * 100.0),
            ]);
        }
        println!("{}", builder.build().with(Style::rounded()).to_string());
        println!();

        let mut builder = Builder::new();
        builder.push_record(["Metric", "Current", "Optimized"]);
        let (c, o) = (&report.current_statistics, &report.optimized_statistics);
        builder.push_record([
            "Annual Return".to_string(),
            format!("{:.2}%", c.annual_return * 100.0),
            format!("{:.2}%", o.annual_return * 100.0),
        ]);
        builder.push_record([
            "Volatility".to_string(),
            format!("{:.2}%", c.volatility * 100.0),
            format!("{:.2}%", o.volatility * 100.0),
        ]);
        builder.push_record([
            "Sharpe Ratio".to_string(),
            format!("{:.2}", c.sharpe_ratio),
            format!("{:.2}", o.sharpe_ratio),
        ]);
        builder.push_record([
            "Max Drawdown (weighted)".to_string(),
            format!("{:.2}%", c.max_drawdown * 100.0),
            format!("{:.2}%", o.max_drawdown * 100.0),
        ]);
        println!("{}", builder.build().with(Style::rounded()).to_string());
        println!();

        println!("{}", "Rationale".bold().underline());
        println!("  {}", report.rationale);
        println!();

        if !report.suggestions.is_empty() {
            println!("{}", "Suggestions".bold().underline());
            for s in &report.suggestions {
                println!(
                    "  {} {:>6.2}%  {}",
                    s.ticker.green(),
                    s.weight * 100.0,
                    s.reason
                );
            }
            println!();
        }

        println!("{}", "═".repeat(60).blue());
    }

    /// Format percentage change with color.
    fn format_pct_change(pct: f64) -> String {
        if pct >= 0.0 {
            format!("(+{:.2}%)", pct).green().to_string()
        } else {
            format!("({:.2}%)", pct).red().to_string()
        }
    }

    /// Export any report to pretty JSON.
    pub fn to_json<T: Serialize>(report: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

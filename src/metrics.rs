//! Performance and risk statistics for a cumulative value series.
//!
//! All ratios share one [`MetricsConfig`]: the risk-free rate, the number of
//! trading days used for annualization, and the variance divisor. Every
//! zero denominator resolves to the `0.0` sentinel so callers never see NaN
//! or infinity.

use crate::types::{finite_or_zero, MetricsResult, PerformanceRecord, SeriesKey};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Annual risk-free rate used by Sharpe, Sortino and alpha.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.03;

/// Trading days per year used for annualization.
pub const DEFAULT_TRADING_DAYS: f64 = 252.0;

/// Divisor applied to every variance, covariance and standard deviation.
pub const DEFAULT_VARIANCE_DIVISOR: VarianceDivisor = VarianceDivisor::Sample;

/// Divisor convention for variance-type estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceDivisor {
    /// Divide by `n`.
    Population,
    /// Divide by `n - 1`.
    #[default]
    Sample,
}

impl VarianceDivisor {
    /// Denominator for `n` observations, `None` when undefined.
    pub fn denominator(&self, n: usize) -> Option<f64> {
        let d = match self {
            VarianceDivisor::Population => n,
            VarianceDivisor::Sample => n.checked_sub(1)?,
        };
        if d == 0 {
            None
        } else {
            Some(d as f64)
        }
    }
}

/// Shared statistical configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub risk_free_rate: f64,
    pub trading_days_per_year: f64,
    pub variance: VarianceDivisor,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            trading_days_per_year: DEFAULT_TRADING_DAYS,
            variance: DEFAULT_VARIANCE_DIVISOR,
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Covariance of two equally long samples, 0 when undefined.
pub fn covariance(a: &[f64], b: &[f64], divisor: VarianceDivisor) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let Some(denominator) = divisor.denominator(a.len()) else {
        return 0.0;
    };
    let (mean_a, mean_b) = (mean(a), mean(b));
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    finite_or_zero(sum / denominator)
}

pub fn variance(values: &[f64], divisor: VarianceDivisor) -> f64 {
    covariance(values, values, divisor)
}

pub fn std_dev(values: &[f64], divisor: VarianceDivisor) -> f64 {
    variance(values, divisor).max(0.0).sqrt()
}

/// Pearson correlation, 0 when either side has no variance.
pub fn correlation(a: &[f64], b: &[f64], divisor: VarianceDivisor) -> f64 {
    let denominator = std_dev(a, divisor) * std_dev(b, divisor);
    if denominator > 0.0 {
        finite_or_zero(covariance(a, b, divisor) / denominator).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Simple returns between consecutive values.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { finite_or_zero(w[1] / w[0] - 1.0) } else { 0.0 })
        .collect()
}

/// Compound annual growth over `observations` values.
pub fn cagr(first: f64, last: f64, observations: usize, trading_days: f64) -> f64 {
    let years = observations as f64 / trading_days;
    if first <= 0.0 || last <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    finite_or_zero((last / first).powf(1.0 / years) - 1.0)
}

/// Drawdown from the running peak at every point (values are ≤ 0).
pub fn drawdowns(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::MIN;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 {
                finite_or_zero(v / peak - 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Deepest drawdown of the series (≤ 0).
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdowns(values).into_iter().fold(0.0, f64::min)
}

/// Annualized standard deviation of periodic returns.
pub fn annualized_volatility(returns: &[f64], config: &MetricsConfig) -> f64 {
    finite_or_zero(std_dev(returns, config.variance) * config.trading_days_per_year.sqrt())
}

/// Calendar bucket used to group a dated series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Month,
}

impl Granularity {
    pub fn label(&self, date: NaiveDate) -> String {
        match self {
            Granularity::Year => format!("{}", date.year()),
            Granularity::Month => format!("{}-{:02}", date.year(), date.month()),
        }
    }
}

/// Return within each calendar bucket: last value over first value, minus one.
///
/// Buckets appear in date order; the input must be sorted by date.
pub fn calendar_returns(points: &[(NaiveDate, f64)], granularity: Granularity) -> Vec<(String, f64)> {
    let mut buckets: Vec<(String, f64, f64)> = Vec::new();
    for (date, value) in points {
        let label = granularity.label(*date);
        match buckets.last_mut() {
            Some((current, _, last)) if *current == label => *last = *value,
            _ => buckets.push((label, *value, *value)),
        }
    }
    buckets
        .into_iter()
        .map(|(label, first, last)| {
            let ret = if first > 0.0 { finite_or_zero(last / first - 1.0) } else { 0.0 };
            (label, ret)
        })
        .collect()
}

/// Computes [`MetricsResult`] for either column of a performance series.
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Compute the full statistic set for `key`.
    ///
    /// Alpha, beta and correlation are measured against the benchmark column;
    /// for the benchmark itself they are fixed at 0, 1 and 1.
    pub fn compute(&self, series: &[PerformanceRecord], key: SeriesKey) -> MetricsResult {
        let cfg = &self.config;
        let values: Vec<f64> = series.iter().map(|r| r.value(key)).collect();
        let returns = period_returns(&values);

        let cagr = self.series_cagr(&values);
        let volatility = annualized_volatility(&returns, cfg);
        let sharpe_ratio = if volatility > 0.0 {
            (cagr - cfg.risk_free_rate) / volatility
        } else {
            0.0
        };

        // Fewer than two distinct losing days leave no downside spread, and
        // Sortino falls back to 0 rather than dividing by zero.
        let negative: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let downside = annualized_volatility(&negative, cfg);
        let sortino = if downside > 0.0 {
            (cagr - cfg.risk_free_rate) / downside
        } else {
            0.0
        };

        let win_rate = if returns.is_empty() {
            0.0
        } else {
            returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
        };

        let dated: Vec<(NaiveDate, f64)> = series.iter().map(|r| (r.date, r.value(key))).collect();
        let yearly = calendar_returns(&dated, Granularity::Year);
        let best_year = yearly.iter().map(|(_, r)| *r).reduce(f64::max).unwrap_or(0.0);
        let worst_year = yearly.iter().map(|(_, r)| *r).reduce(f64::min).unwrap_or(0.0);

        let (alpha, beta, correlation_to_benchmark) = match key {
            SeriesKey::Benchmark => (0.0, 1.0, 1.0),
            SeriesKey::Portfolio => {
                let bench_values: Vec<f64> = series.iter().map(|r| r.benchmark).collect();
                let bench_returns = period_returns(&bench_values);
                let bench_variance = variance(&bench_returns, cfg.variance);
                let beta = if bench_variance > 0.0 {
                    covariance(&returns, &bench_returns, cfg.variance) / bench_variance
                } else {
                    0.0
                };
                let bench_cagr = self.series_cagr(&bench_values);
                let alpha =
                    cagr - (cfg.risk_free_rate + beta * (bench_cagr - cfg.risk_free_rate));
                let corr = correlation(&returns, &bench_returns, cfg.variance);
                (alpha, beta, corr)
            }
        };

        MetricsResult {
            cagr: finite_or_zero(cagr),
            volatility: finite_or_zero(volatility),
            sharpe_ratio: finite_or_zero(sharpe_ratio),
            sortino: finite_or_zero(sortino),
            max_drawdown: max_drawdown(&values),
            win_rate,
            best_year: finite_or_zero(best_year),
            worst_year: finite_or_zero(worst_year),
            alpha: finite_or_zero(alpha),
            beta: finite_or_zero(beta),
            correlation_to_benchmark: finite_or_zero(correlation_to_benchmark),
        }
    }

    fn series_cagr(&self, values: &[f64]) -> f64 {
        match (values.first(), values.last()) {
            (Some(&first), Some(&last)) => {
                cagr(first, last, values.len(), self.config.trading_days_per_year)
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn records(portfolio: &[f64], benchmark: &[f64]) -> Vec<PerformanceRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        portfolio
            .iter()
            .zip(benchmark)
            .enumerate()
            .map(|(i, (p, b))| PerformanceRecord {
                date: start + Duration::days(i as i64),
                portfolio: *p,
                benchmark: *b,
            })
            .collect()
    }

    #[test]
    fn test_variance_divisors() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((variance(&values, VarianceDivisor::Population) - 1.25).abs() < 1e-12);
        assert!((variance(&values, VarianceDivisor::Sample) - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(variance(&[1.0], VarianceDivisor::Sample), 0.0);
        assert_eq!(variance(&[], VarianceDivisor::Population), 0.0);
    }

    #[test]
    fn test_correlation_degenerate() {
        assert_eq!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0], VarianceDivisor::Sample), 0.0);
        let c = correlation(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0], VarianceDivisor::Sample);
        assert!((c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawdowns() {
        let values = [1.0, 1.2, 0.9, 1.0, 1.3, 1.04];
        let dd = drawdowns(&values);
        assert_eq!(dd[0], 0.0);
        assert_eq!(dd[1], 0.0);
        assert!((dd[2] + 0.25).abs() < 1e-12);
        assert!((dd[5] + 0.2).abs() < 1e-12);
        assert!((max_drawdown(&values) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_scenario_metrics() {
        let series = records(&[1.0, 1.015, 1.07], &[1.0, 1.05, 1.1]);
        let engine = MetricsEngine::default();
        let m = engine.compute(&series, SeriesKey::Portfolio);

        let returns: [f64; 2] = [0.015, 1.07 / 1.015 - 1.0];
        let mu = (returns[0] + returns[1]) / 2.0;
        let sample_var = ((returns[0] - mu).powi(2) + (returns[1] - mu).powi(2)) / 1.0;
        let vol = sample_var.sqrt() * 252.0_f64.sqrt();
        let cagr = 1.07_f64.powf(252.0 / 3.0) - 1.0;

        assert!((m.cagr - cagr).abs() / cagr < 1e-9);
        assert!((m.volatility - vol).abs() < 1e-9);
        assert!((m.sharpe_ratio - (cagr - 0.03) / vol).abs() / m.sharpe_ratio < 1e-9);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.sortino, 0.0);
        assert_eq!(m.win_rate, 1.0);
        assert!((m.best_year - 0.07).abs() < 1e-12);
        assert!((m.worst_year - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_benchmark_fixed_relationship() {
        let series = records(&[1.0, 1.1, 1.0, 1.2], &[1.0, 0.9, 1.05, 1.1]);
        let m = MetricsEngine::default().compute(&series, SeriesKey::Benchmark);
        assert_eq!(m.beta, 1.0);
        assert_eq!(m.alpha, 0.0);
        assert_eq!(m.correlation_to_benchmark, 1.0);
        assert!(m.max_drawdown < 0.0);
    }

    #[test]
    fn test_beta_of_levered_portfolio() {
        let bench_returns = [0.01, -0.02, 0.015, 0.005, -0.01, 0.02];
        let mut bench = vec![1.0];
        let mut port = vec![1.0];
        for r in bench_returns {
            bench.push(bench.last().unwrap() * (1.0 + r));
            port.push(port.last().unwrap() * (1.0 + 2.0 * r));
        }
        let m = MetricsEngine::default().compute(&records(&port, &bench), SeriesKey::Portfolio);
        assert!((m.beta - 2.0).abs() < 1e-9);
        assert!((m.correlation_to_benchmark - 1.0).abs() < 1e-9);

        let bench_cagr = cagr(1.0, *bench.last().unwrap(), bench.len(), 252.0);
        let expected_alpha = m.cagr - (0.03 + 2.0 * (bench_cagr - 0.03));
        assert!((m.alpha - expected_alpha).abs() < 1e-9);
    }

    #[test]
    fn test_flat_series_yields_sentinels() {
        let series = records(&[1.0; 10], &[1.0; 10]);
        let m = MetricsEngine::default().compute(&series, SeriesKey::Portfolio);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.sortino, 0.0);
        assert_eq!(m.beta, 0.0);
        assert_eq!(m.correlation_to_benchmark, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert!(m.alpha.is_finite());
    }

    #[test]
    fn test_sortino_with_losses() {
        let series = records(&[1.0, 1.02, 1.0, 1.03, 1.01, 1.05], &[1.0; 6]);
        let config = MetricsConfig {
            variance: VarianceDivisor::Population,
            ..Default::default()
        };
        let m = MetricsEngine::new(config).compute(&series, SeriesKey::Portfolio);
        assert!(m.sortino.is_finite());
        assert!(m.sortino > 0.0);
        assert!((m.win_rate - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_sortino_needs_two_losses() {
        let one_loss = records(&[1.0, 1.02, 1.01, 1.03, 1.05], &[1.0; 5]);
        let m = MetricsEngine::default().compute(&one_loss, SeriesKey::Portfolio);
        assert_eq!(m.sortino, 0.0);
        assert!(m.sharpe_ratio > 0.0);

        let population = MetricsConfig {
            variance: VarianceDivisor::Population,
            ..Default::default()
        };
        let m = MetricsEngine::new(population).compute(&one_loss, SeriesKey::Portfolio);
        assert_eq!(m.sortino, 0.0);

        let two_losses = records(&[1.0, 1.02, 1.01, 1.03, 1.01, 1.06], &[1.0; 6]);
        let m = MetricsEngine::default().compute(&two_losses, SeriesKey::Portfolio);
        assert!(m.sortino > 0.0);
    }

    #[test]
    fn test_constant_return_cagr() {
        let r: f64 = 0.001;
        let n = 2520;
        let values: Vec<f64> = (0..=n).map(|i| (1.0 + r).powi(i)).collect();
        let series = records(&values, &values);
        let m = MetricsEngine::default().compute(&series, SeriesKey::Portfolio);
        let expected = (1.0 + r).powf(252.0) - 1.0;
        assert!((m.cagr - expected).abs() < 1e-3);
    }

    #[test]
    fn test_calendar_returns() {
        let points = vec![
            (NaiveDate::from_ymd_opt(2023, 11, 30).unwrap(), 1.0),
            (NaiveDate::from_ymd_opt(2023, 12, 29).unwrap(), 1.1),
            (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 1.0),
            (NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(), 1.2),
        ];
        let yearly = calendar_returns(&points, Granularity::Year);
        assert_eq!(yearly.len(), 2);
        assert_eq!(yearly[0].0, "2023");
        assert!((yearly[0].1 - 0.1).abs() < 1e-12);
        assert!((yearly[1].1 - 0.2).abs() < 1e-12);

        let monthly = calendar_returns(&points, Granularity::Month);
        assert_eq!(monthly.len(), 4);
        assert_eq!(monthly[1].0, "2023-12");
        assert_eq!(monthly[1].1, 0.0);
    }

    #[test]
    fn test_empty_series() {
        let m = MetricsEngine::default().compute(&[], SeriesKey::Portfolio);
        assert_eq!(m.cagr, 0.0);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.best_year, 0.0);
        assert!((m.alpha + 0.03).abs() < 1e-12);
    }
}

//! Sliding-window return, volatility and Sharpe series.

use crate::error::{FolioError, Result};
use crate::metrics::{annualized_volatility, period_returns, MetricsConfig};
use crate::types::{finite_or_zero, PerformanceRecord, SeriesKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default window length in trading days.
pub const DEFAULT_ROLLING_WINDOW: usize = 30;

/// Windowed statistics ending just before `date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint {
    pub date: NaiveDate,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
}

/// Computes rolling statistics over a fixed window.
///
/// The rolling Sharpe ratio uses a zero risk-free rate, unlike the full-period
/// Sharpe in [`crate::metrics::MetricsEngine`] which subtracts the configured
/// rate. Only the variance divisor and trading-day count are taken from the
/// shared [`MetricsConfig`].
#[derive(Debug, Clone)]
pub struct RollingMetricsEngine {
    window: usize,
    config: MetricsConfig,
}

impl RollingMetricsEngine {
    pub fn new(window: usize, config: MetricsConfig) -> Result<Self> {
        if window < 2 {
            return Err(FolioError::ConfigError(format!(
                "rolling window must be at least 2, got {}",
                window
            )));
        }
        Ok(Self { window, config })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// One point per index `i` in `window..len`, computed over `[i - window, i)`.
    pub fn compute(&self, series: &[PerformanceRecord], key: SeriesKey) -> Vec<RollingPoint> {
        let w = self.window;
        if series.len() <= w {
            return Vec::new();
        }

        let values: Vec<f64> = series.iter().map(|r| r.value(key)).collect();
        let exponent = self.config.trading_days_per_year / w as f64;

        (w..values.len())
            .map(|i| {
                let window = &values[i - w..i];
                let (start, end) = (window[0], window[w - 1]);
                let annualized_return = if start > 0.0 && end > 0.0 {
                    finite_or_zero((end / start).powf(exponent) - 1.0)
                } else {
                    0.0
                };
                let volatility = annualized_volatility(&period_returns(window), &self.config);
                let sharpe = if volatility > 0.0 {
                    finite_or_zero(annualized_return / volatility)
                } else {
                    0.0
                };
                RollingPoint {
                    date: series[i].date,
                    annualized_return,
                    volatility,
                    sharpe,
                }
            })
            .collect()
    }
}

impl Default for RollingMetricsEngine {
    fn default() -> Self {
        Self {
            window: DEFAULT_ROLLING_WINDOW,
            config: MetricsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn records(values: &[f64]) -> Vec<PerformanceRecord> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| PerformanceRecord {
                date: start + Duration::days(i as i64),
                portfolio: *v,
                benchmark: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_point_count_and_dates() {
        let values: Vec<f64> = (0..40).map(|i| 1.0 + i as f64 * 0.01).collect();
        let series = records(&values);
        let engine = RollingMetricsEngine::new(10, MetricsConfig::default()).unwrap();
        let points = engine.compute(&series, SeriesKey::Portfolio);

        assert_eq!(points.len(), 30);
        assert_eq!(points[0].date, series[10].date);
        assert_eq!(points.last().unwrap().date, series[39].date);
    }

    #[test]
    fn test_window_return_uses_first_and_last_in_window() {
        let values: Vec<f64> = (0..6).map(|i| 1.01_f64.powi(i)).collect();
        let series = records(&values);
        let engine = RollingMetricsEngine::new(5, MetricsConfig::default()).unwrap();
        let points = engine.compute(&series, SeriesKey::Portfolio);

        assert_eq!(points.len(), 1);
        let expected = (values[4] / values[0]).powf(252.0 / 5.0) - 1.0;
        assert!((points[0].annualized_return - expected).abs() < 1e-9);
        // Constant growth has no dispersion.
        assert!(points[0].volatility < 1e-9);
    }

    #[test]
    fn test_sharpe_has_no_risk_free_rate() {
        let values = [1.0, 1.02, 0.99, 1.03, 1.0, 1.04, 1.05];
        let series = records(&values);
        let engine = RollingMetricsEngine::new(5, MetricsConfig::default()).unwrap();
        for p in engine.compute(&series, SeriesKey::Portfolio) {
            assert!(p.volatility > 0.0);
            assert!((p.sharpe - p.annualized_return / p.volatility).abs() < 1e-9);
        }
    }

    #[test]
    fn test_flat_benchmark_is_zero() {
        let values: Vec<f64> = (0..35).map(|i| 1.0 + i as f64 * 0.001).collect();
        let points = RollingMetricsEngine::default().compute(&records(&values), SeriesKey::Benchmark);
        assert_eq!(points.len(), 5);
        for p in points {
            assert_eq!(p.annualized_return, 0.0);
            assert_eq!(p.volatility, 0.0);
            assert_eq!(p.sharpe, 0.0);
        }
    }

    #[test]
    fn test_short_series_and_bad_window() {
        let series = records(&[1.0, 1.1, 1.2]);
        assert!(RollingMetricsEngine::default()
            .compute(&series, SeriesKey::Portfolio)
            .is_empty());
        assert!(RollingMetricsEngine::new(1, MetricsConfig::default()).is_err());
    }
}

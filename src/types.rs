//! Core data types shared across the analysis pipeline.

use crate::error::{FolioError, Result};
use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Tolerance allowed when checking that a weight vector sums to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-3;

/// A single price observation for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }

    /// A usable observation has a finite, strictly positive price.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Ordered map from ticker to value.
///
/// Iteration order is insertion order, which callers keep equal to the
/// request's ticker list so output ordering stays deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for TickerMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> TickerMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a value. An existing ticker keeps its position and is overwritten.
    pub fn insert(&mut self, ticker: impl Into<String>, value: V) {
        let ticker = ticker.into();
        match self.entries.iter_mut().find(|(t, _)| *t == ticker) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((ticker, value)),
        }
    }

    pub fn get(&self, ticker: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.get(ticker).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v))
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl TickerMap<f64> {
    /// Build a weight map from parallel ticker/weight slices.
    pub fn from_weights(tickers: &[String], weights: &[f64]) -> Self {
        tickers
            .iter()
            .cloned()
            .zip(weights.iter().copied())
            .collect()
    }

    /// Sum of all values.
    pub fn total(&self) -> f64 {
        self.values().sum()
    }
}

impl<V> FromIterator<(String, V)> for TickerMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = TickerMap::new();
        for (ticker, value) in iter {
            map.insert(ticker, value);
        }
        map
    }
}

impl<V: Serialize> Serialize for TickerMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (ticker, value) in &self.entries {
            map.serialize_entry(ticker, value)?;
        }
        map.end()
    }
}

struct TickerMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for TickerMapVisitor<V> {
    type Value = TickerMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map keyed by ticker")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
        let mut map = TickerMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((ticker, value)) = access.next_entry::<String, V>()? {
            map.insert(ticker, value);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for TickerMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(TickerMapVisitor(PhantomData))
    }
}

/// How often the simulated portfolio is reset to its target weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalancePeriod {
    Monthly,
    #[default]
    Quarterly,
    Semiannually,
    Annually,
    None,
}

impl RebalancePeriod {
    /// Rebalance interval measured in aligned rows, `None` when never rebalancing.
    pub fn interval_days(&self) -> Option<usize> {
        match self {
            RebalancePeriod::Monthly => Some(30),
            RebalancePeriod::Quarterly => Some(90),
            RebalancePeriod::Semiannually => Some(180),
            RebalancePeriod::Annually => Some(365),
            RebalancePeriod::None => None,
        }
    }
}

impl fmt::Display for RebalancePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebalancePeriod::Monthly => "monthly",
            RebalancePeriod::Quarterly => "quarterly",
            RebalancePeriod::Semiannually => "semiannually",
            RebalancePeriod::Annually => "annually",
            RebalancePeriod::None => "none",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RebalancePeriod {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(RebalancePeriod::Monthly),
            "quarterly" => Ok(RebalancePeriod::Quarterly),
            "semiannually" | "semi-annually" => Ok(RebalancePeriod::Semiannually),
            "annually" | "yearly" => Ok(RebalancePeriod::Annually),
            "none" | "never" => Ok(RebalancePeriod::None),
            other => Err(FolioError::InvalidInput(format!(
                "unknown rebalance period: {}",
                other
            ))),
        }
    }
}

/// Allocation heuristic used by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationModel {
    MeanVariance,
    MinVolatility,
    MaxSharpe,
    RiskParity,
    EqualWeight,
}

impl fmt::Display for OptimizationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizationModel::MeanVariance => "mean_variance",
            OptimizationModel::MinVolatility => "min_volatility",
            OptimizationModel::MaxSharpe => "max_sharpe",
            OptimizationModel::RiskParity => "risk_parity",
            OptimizationModel::EqualWeight => "equal_weight",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OptimizationModel {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "mean_variance" => Ok(OptimizationModel::MeanVariance),
            "min_volatility" => Ok(OptimizationModel::MinVolatility),
            "max_sharpe" => Ok(OptimizationModel::MaxSharpe),
            "risk_parity" => Ok(OptimizationModel::RiskParity),
            "equal_weight" => Ok(OptimizationModel::EqualWeight),
            other => Err(FolioError::InvalidInput(format!(
                "unknown optimization model: {}",
                other
            ))),
        }
    }
}

/// Which column of a performance series a statistic is computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKey {
    Portfolio,
    Benchmark,
}

/// Cumulative portfolio and benchmark value on one date, base 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub date: NaiveDate,
    pub portfolio: f64,
    pub benchmark: f64,
}

impl PerformanceRecord {
    pub fn value(&self, key: SeriesKey) -> f64 {
        match key {
            SeriesKey::Portfolio => self.portfolio,
            SeriesKey::Benchmark => self.benchmark,
        }
    }
}

/// Fraction of portfolio value held in each ticker on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub date: NaiveDate,
    pub weights: TickerMap<f64>,
}

/// Standard performance and risk statistics for one value series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsResult {
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub best_year: f64,
    pub worst_year: f64,
    pub alpha: f64,
    pub beta: f64,
    pub correlation_to_benchmark: f64,
}

/// Validate a ticker/weight pair as supplied by a caller.
///
/// Lengths must match, tickers must be distinct, weights must be finite and
/// non-negative, and they must sum to one within [`WEIGHT_TOLERANCE`].
pub fn validate_weights(tickers: &[String], weights: &[f64]) -> Result<()> {
    if tickers.len() != weights.len() {
        return Err(FolioError::InputMismatch {
            tickers: tickers.len(),
            weights: weights.len(),
        });
    }
    if tickers.is_empty() {
        return Err(FolioError::InvalidInput("no tickers supplied".to_string()));
    }
    ensure_distinct(tickers)?;
    if let Some((ticker, w)) = tickers
        .iter()
        .zip(weights)
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(FolioError::InvalidWeights(format!(
            "weight for {} must be a non-negative number, got {}",
            ticker, w
        )));
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(FolioError::InvalidWeights(format!(
            "weights sum to {:.4}, expected 1.0",
            total
        )));
    }
    Ok(())
}

/// Reject a ticker list that names the same instrument twice.
pub fn ensure_distinct(tickers: &[String]) -> Result<()> {
    if let Some((i, ticker)) = tickers
        .iter()
        .enumerate()
        .find(|(i, t)| tickers[..*i].contains(t))
    {
        return Err(FolioError::InvalidInput(format!(
            "ticker {} appears more than once (position {})",
            ticker,
            i + 1
        )));
    }
    Ok(())
}

/// Replace NaN and infinities with the zero sentinel.
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

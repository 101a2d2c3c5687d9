//! Heuristic portfolio weight optimization.
//!
//! Each [`AllocationModel`] scores the current holdings, the scores are
//! normalized into target weights, and the targets are blended with the
//! current weights before a final re-normalization. Models may also propose
//! a few candidates from an optional universe of tickers not yet held.
//!
//! These are approximations: no quadratic program is solved.
//!
//! # Example
//!
//! ```ignore
//! use folio::optimizer::{AllocationOptimizer, OptimizationInput, OptimizerConfig};
//! use folio::types::OptimizationModel;
//!
//! let optimizer = AllocationOptimizer::new(OptimizerConfig::default());
//! let result = optimizer.optimize(OptimizationModel::RiskParity, &input)?;
//! ```

use crate::analytics::{AssetStatistics, CorrelationMatrix};
use crate::error::{FolioError, Result};
use crate::types::{ensure_distinct, finite_or_zero, OptimizationModel, TickerMap};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// Blend ratios, suggestion thresholds and suggestion sizing.
///
/// Blend values are the share kept from the current weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub mean_variance_blend: f64,
    pub min_volatility_blend: f64,
    pub max_sharpe_blend: f64,
    pub risk_parity_blend: f64,
    /// Minimum Sharpe ratio for a mean-variance suggestion.
    pub mean_variance_min_sharpe: f64,
    /// Minimum Sharpe ratio for a max-Sharpe suggestion.
    pub max_sharpe_min_sharpe: f64,
    /// Annual return a candidate must exceed for min-volatility and risk-parity suggestions.
    pub min_candidate_return: f64,
    pub max_suggestions: usize,
    /// Advisory weight attached to each suggestion.
    pub suggestion_weight: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            mean_variance_blend: 0.3,
            min_volatility_blend: 0.4,
            max_sharpe_blend: 0.3,
            risk_parity_blend: 0.4,
            mean_variance_min_sharpe: 0.5,
            max_sharpe_min_sharpe: 0.8,
            min_candidate_return: 0.0,
            max_suggestions: 2,
            suggestion_weight: 0.10,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, blend) in [
            ("mean_variance_blend", self.mean_variance_blend),
            ("min_volatility_blend", self.min_volatility_blend),
            ("max_sharpe_blend", self.max_sharpe_blend),
            ("risk_parity_blend", self.risk_parity_blend),
        ] {
            if !(0.0..=1.0).contains(&blend) {
                return Err(FolioError::ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, blend
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.suggestion_weight) {
            return Err(FolioError::ConfigError(format!(
                "suggestion_weight must be within [0, 1], got {}",
                self.suggestion_weight
            )));
        }
        Ok(())
    }
}

/// A ticker from the universe proposed for addition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub ticker: String,
    pub weight: f64,
    pub reason: String,
}

/// New weights for the current holdings plus optional additions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: TickerMap<f64>,
    pub rationale: String,
    pub suggestions: Vec<Suggestion>,
}

/// Aggregate statistics of a weighted portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioStatistics {
    pub annual_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Weighted average of the assets' drawdowns, not a path-dependent drawdown.
    pub max_drawdown: f64,
}

/// Everything a model needs to score holdings and rank candidates.
#[derive(Debug, Clone, Copy)]
pub struct OptimizationInput<'a> {
    pub tickers: &'a [String],
    pub weights: &'a [f64],
    /// Statistics for every held ticker and every universe ticker.
    pub statistics: &'a TickerMap<AssetStatistics>,
    pub correlations: &'a CorrelationMatrix,
    pub universe: &'a [String],
}

impl<'a> OptimizationInput<'a> {
    /// Mean absolute correlation between `ticker` and the current holdings.
    pub fn average_abs_correlation(&self, ticker: &str) -> f64 {
        if self.tickers.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .tickers
            .iter()
            .map(|held| self.correlations.get_or_default(ticker, held).abs())
            .sum();
        total / self.tickers.len() as f64
    }
}

/// A weighting heuristic.
pub trait AllocationModel {
    fn kind(&self) -> OptimizationModel;

    /// Human-readable model name.
    fn name(&self) -> &str;

    /// One-line description of the scoring rule.
    fn scoring_rule(&self) -> &str;

    /// Raw, non-normalized score for a held asset.
    fn raw_score(&self, asset: &AssetStatistics) -> f64;

    /// Share of the current weights kept when blending, `None` to skip blending.
    fn current_share(&self) -> Option<f64>;

    /// Reason a candidate qualifies for suggestion, `None` if it does not.
    fn suggestion_reason(&self, _candidate: &AssetStatistics, _input: &OptimizationInput) -> Option<String> {
        None
    }

    /// Ascending sort key among qualifying candidates.
    fn suggestion_rank(&self, _candidate: &AssetStatistics, _input: &OptimizationInput) -> f64 {
        0.0
    }
}

/// Return-to-risk scoring.
pub struct MeanVarianceModel {
    blend: f64,
    min_sharpe: f64,
}

impl MeanVarianceModel {
    pub fn new(blend: f64, min_sharpe: f64) -> Self {
        Self { blend, min_sharpe }
    }
}

impl AllocationModel for MeanVarianceModel {
    fn kind(&self) -> OptimizationModel {
        OptimizationModel::MeanVariance
    }

    fn name(&self) -> &str {
        "Mean-Variance"
    }

    fn scoring_rule(&self) -> &str {
        "weights proportional to positive return/volatility"
    }

    fn raw_score(&self, asset: &AssetStatistics) -> f64 {
        if asset.volatility > 0.0 {
            (asset.annual_return / asset.volatility).max(0.0)
        } else {
            0.0
        }
    }

    fn current_share(&self) -> Option<f64> {
        Some(self.blend)
    }

    fn suggestion_reason(&self, candidate: &AssetStatistics, _input: &OptimizationInput) -> Option<String> {
        (candidate.sharpe_ratio > self.min_sharpe).then(|| {
            format!(
                "Sharpe ratio {:.2} exceeds {:.2}",
                candidate.sharpe_ratio, self.min_sharpe
            )
        })
    }

    fn suggestion_rank(&self, candidate: &AssetStatistics, _input: &OptimizationInput) -> f64 {
        -candidate.sharpe_ratio
    }
}

/// Inverse-volatility scoring.
pub struct MinVolatilityModel {
    blend: f64,
    min_return: f64,
}

impl MinVolatilityModel {
    pub fn new(blend: f64, min_return: f64) -> Self {
        Self { blend, min_return }
    }
}

impl AllocationModel for MinVolatilityModel {
    fn kind(&self) -> OptimizationModel {
        OptimizationModel::MinVolatility
    }

    fn name(&self) -> &str {
        "Minimum Volatility"
    }

    fn scoring_rule(&self) -> &str {
        "weights proportional to 1/volatility"
    }

    fn raw_score(&self, asset: &AssetStatistics) -> f64 {
        if asset.volatility > 0.0 {
            1.0 / asset.volatility
        } else {
            0.0
        }
    }

    fn current_share(&self) -> Option<f64> {
        Some(self.blend)
    }

    fn suggestion_reason(&self, candidate: &AssetStatistics, _input: &OptimizationInput) -> Option<String> {
        (candidate.annual_return > self.min_return).then(|| {
            format!(
                "Positive return of {:.1}% with {:.1}% volatility",
                candidate.annual_return * 100.0,
                candidate.volatility * 100.0
            )
        })
    }

    fn suggestion_rank(&self, candidate: &AssetStatistics, _input: &OptimizationInput) -> f64 {
        candidate.volatility
    }
}

/// Positive-Sharpe scoring.
pub struct MaxSharpeModel {
    blend: f64,
    min_sharpe: f64,
}

impl MaxSharpeModel {
    pub fn new(blend: f64, min_sharpe: f64) -> Self {
        Self { blend, min_sharpe }
    }
}

impl AllocationModel for MaxSharpeModel {
    fn kind(&self) -> OptimizationModel {
        OptimizationModel::MaxSharpe
    }

    fn name(&self) -> &str {
        "Maximum Sharpe"
    }

    fn scoring_rule(&self) -> &str {
        "weights proportional to positive Sharpe ratio"
    }

    fn raw_score(&self, asset: &AssetStatistics) -> f64 {
        asset.sharpe_ratio.max(0.0)
    }

    fn current_share(&self) -> Option<f64> {
        Some(self.blend)
    }

    fn suggestion_reason(&self, candidate: &AssetStatistics, _input: &OptimizationInput) -> Option<String> {
        (candidate.sharpe_ratio > self.min_sharpe).then(|| {
            format!(
                "Sharpe ratio {:.2} exceeds {:.2}",
                candidate.sharpe_ratio, self.min_sharpe
            )
        })
    }

    fn suggestion_rank(&self, candidate: &AssetStatistics, _input: &OptimizationInput) -> f64 {
        -candidate.sharpe_ratio
    }
}

/// Inverse-variance scoring as a proxy for equal risk contribution.
pub struct RiskParityModel {
    blend: f64,
    min_return: f64,
}

impl RiskParityModel {
    pub fn new(blend: f64, min_return: f64) -> Self {
        Self { blend, min_return }
    }
}

impl AllocationModel for RiskParityModel {
    fn kind(&self) -> OptimizationModel {
        OptimizationModel::RiskParity
    }

    fn name(&self) -> &str {
        "Risk Parity"
    }

    fn scoring_rule(&self) -> &str {
        "weights proportional to 1/volatility²"
    }

    fn raw_score(&self, asset: &AssetStatistics) -> f64 {
        if asset.volatility > 0.0 {
            1.0 / asset.volatility.powi(2)
        } else {
            0.0
        }
    }

    fn current_share(&self) -> Option<f64> {
        Some(self.blend)
    }

    fn suggestion_reason(&self, candidate: &AssetStatistics, input: &OptimizationInput) -> Option<String> {
        (candidate.annual_return > self.min_return).then(|| {
            format!(
                "Positive return of {:.1}% with average correlation {:.2} to current holdings",
                candidate.annual_return * 100.0,
                input.average_abs_correlation(&candidate.ticker)
            )
        })
    }

    fn suggestion_rank(&self, candidate: &AssetStatistics, input: &OptimizationInput) -> f64 {
        input.average_abs_correlation(&candidate.ticker)
    }
}

/// Uniform 1/N weights, no blending and no suggestions.
pub struct EqualWeightModel;

impl AllocationModel for EqualWeightModel {
    fn kind(&self) -> OptimizationModel {
        OptimizationModel::EqualWeight
    }

    fn name(&self) -> &str {
        "Equal Weight"
    }

    fn scoring_rule(&self) -> &str {
        "every holding receives 1/N"
    }

    fn raw_score(&self, _asset: &AssetStatistics) -> f64 {
        1.0
    }

    fn current_share(&self) -> Option<f64> {
        None
    }
}

/// Build the model for `kind` from the optimizer configuration.
pub fn model_for(kind: OptimizationModel, config: &OptimizerConfig) -> Box<dyn AllocationModel> {
    match kind {
        OptimizationModel::MeanVariance => Box::new(MeanVarianceModel::new(
            config.mean_variance_blend,
            config.mean_variance_min_sharpe,
        )),
        OptimizationModel::MinVolatility => Box::new(MinVolatilityModel::new(
            config.min_volatility_blend,
            config.min_candidate_return,
        )),
        OptimizationModel::MaxSharpe => Box::new(MaxSharpeModel::new(
            config.max_sharpe_blend,
            config.max_sharpe_min_sharpe,
        )),
        OptimizationModel::RiskParity => Box::new(RiskParityModel::new(
            config.risk_parity_blend,
            config.min_candidate_return,
        )),
        OptimizationModel::EqualWeight => Box::new(EqualWeightModel),
    }
}

/// Scale non-negative values to sum to one; `None` when they sum to zero.
fn normalize(values: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        Some(values.iter().map(|v| v / total).collect())
    } else {
        None
    }
}

fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Applies a model to an [`OptimizationInput`].
#[derive(Debug, Clone, Default)]
pub struct AllocationOptimizer {
    config: OptimizerConfig,
}

impl AllocationOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn optimize(&self, kind: OptimizationModel, input: &OptimizationInput) -> Result<OptimizationResult> {
        let model = model_for(kind, &self.config);
        self.optimize_with(model.as_ref(), input)
    }

    /// Run an arbitrary model.
    pub fn optimize_with(
        &self,
        model: &dyn AllocationModel,
        input: &OptimizationInput,
    ) -> Result<OptimizationResult> {
        if input.tickers.len() != input.weights.len() {
            return Err(FolioError::InputMismatch {
                tickers: input.tickers.len(),
                weights: input.weights.len(),
            });
        }
        if input.tickers.is_empty() {
            return Err(FolioError::InvalidInput("no tickers supplied".to_string()));
        }
        ensure_distinct(input.tickers)?;

        let assets = input
            .tickers
            .iter()
            .map(|t| {
                input
                    .statistics
                    .get(t)
                    .ok_or_else(|| FolioError::MissingTicker(t.clone()))
            })
            .collect::<Result<Vec<&AssetStatistics>>>()?;

        info!(
            "Optimizing {} holdings with {} model",
            assets.len(),
            model.name()
        );

        let n = assets.len();
        let scores: Vec<f64> = assets
            .iter()
            .map(|a| finite_or_zero(model.raw_score(a)).max(0.0))
            .collect();
        let (target, fell_back) = match normalize(&scores) {
            Some(w) => (w, false),
            None => {
                debug!("All raw scores are zero, using equal weights");
                (equal_weights(n), true)
            }
        };

        let blended: Vec<f64> = match model.current_share() {
            Some(share) => input
                .weights
                .iter()
                .zip(&target)
                .map(|(current, new)| share * current + (1.0 - share) * new)
                .collect(),
            None => target,
        };
        let final_weights = normalize(&blended).unwrap_or_else(|| equal_weights(n));

        let weights = TickerMap::from_weights(input.tickers, &final_weights);
        let suggestions = self.suggestions(model, input);
        let rationale = self.rationale(model, input, &final_weights, fell_back);

        Ok(OptimizationResult {
            weights,
            rationale,
            suggestions,
        })
    }

    fn suggestions(&self, model: &dyn AllocationModel, input: &OptimizationInput) -> Vec<Suggestion> {
        let mut seen: Vec<&str> = Vec::new();
        let mut candidates: Vec<(f64, Suggestion)> = Vec::new();

        for ticker in input.universe {
            if input.tickers.contains(ticker) || seen.contains(&ticker.as_str()) {
                continue;
            }
            seen.push(ticker);
            let Some(stats) = input.statistics.get(ticker) else {
                continue;
            };
            if let Some(reason) = model.suggestion_reason(stats, input) {
                candidates.push((
                    finite_or_zero(model.suggestion_rank(stats, input)),
                    Suggestion {
                        ticker: ticker.clone(),
                        weight: self.config.suggestion_weight,
                        reason,
                    },
                ));
            }
        }

        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        candidates
            .into_iter()
            .take(self.config.max_suggestions)
            .map(|(_, s)| s)
            .collect()
    }

    fn rationale(
        &self,
        model: &dyn AllocationModel,
        input: &OptimizationInput,
        weights: &[f64],
        fell_back: bool,
    ) -> String {
        let mut text = format!("{} model: {}", model.name(), model.scoring_rule());
        if let Some(share) = model.current_share() {
            text.push_str(&format!(
                ", blended {:.0}% current / {:.0}% model",
                share * 100.0,
                (1.0 - share) * 100.0
            ));
        }
        text.push('.');

        if fell_back {
            text.push_str(" No holding had a positive score, so equal weights were used as the model target.");
        }

        let changes: Vec<(&String, f64)> = input
            .tickers
            .iter()
            .zip(weights.iter().zip(input.weights))
            .map(|(t, (new, old))| (t, new - old))
            .collect();
        let up = changes
            .iter()
            .filter(|(_, d)| *d > 1e-4)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        let down = changes
            .iter()
            .filter(|(_, d)| *d < -1e-4)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        match (up, down) {
            (None, None) => text.push_str(" Weights are essentially unchanged."),
            _ => {
                if let Some((t, d)) = up {
                    text.push_str(&format!(" Largest increase: {} ({:+.1}%).", t, d * 100.0));
                }
                if let Some((t, d)) = down {
                    text.push_str(&format!(" Largest decrease: {} ({:+.1}%).", t, d * 100.0));
                }
            }
        }

        text
    }
}

/// Aggregate return, volatility, Sharpe and drawdown of a weighted portfolio.
///
/// Volatility uses the full correlation-weighted covariance; Sharpe is
/// return over volatility (0 when volatility is 0); drawdown is the
/// weight-averaged asset drawdown.
pub fn portfolio_statistics(
    tickers: &[String],
    weights: &[f64],
    statistics: &TickerMap<AssetStatistics>,
    correlations: &CorrelationMatrix,
) -> Result<PortfolioStatistics> {
    if tickers.len() != weights.len() {
        return Err(FolioError::InputMismatch {
            tickers: tickers.len(),
            weights: weights.len(),
        });
    }
    let assets = tickers
        .iter()
        .map(|t| {
            statistics
                .get(t)
                .ok_or_else(|| FolioError::MissingTicker(t.clone()))
        })
        .collect::<Result<Vec<&AssetStatistics>>>()?;

    let annual_return: f64 = assets
        .iter()
        .zip(weights)
        .map(|(a, w)| w * a.annual_return)
        .sum();

    let mut variance = 0.0;
    for (i, (a, wa)) in assets.iter().zip(weights).enumerate() {
        for (j, (b, wb)) in assets.iter().zip(weights).enumerate() {
            let rho = if i == j {
                1.0
            } else {
                correlations.get_or_default(&a.ticker, &b.ticker)
            };
            variance += wa * wb * rho * a.volatility * b.volatility;
        }
    }
    let volatility = finite_or_zero(variance.max(0.0).sqrt());

    let sharpe_ratio = if volatility > 0.0 {
        finite_or_zero(annual_return / volatility)
    } else {
        0.0
    };

    let max_drawdown: f64 = assets
        .iter()
        .zip(weights)
        .map(|(a, w)| w * a.max_drawdown)
        .sum();

    Ok(PortfolioStatistics {
        annual_return: finite_or_zero(annual_return),
        volatility,
        sharpe_ratio,
        max_drawdown: finite_or_zero(max_drawdown),
    })
}

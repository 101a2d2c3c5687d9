//! Buy-and-hold portfolio simulation with periodic rebalancing.
//!
//! The simulator replays an aligned price table one row at a time. Every
//! ticker's dollar allocation compounds with its own daily return; tickers
//! without a return on a given row keep their dollar value. When the
//! rebalance interval has elapsed the allocations are reset to the target
//! weights at the current portfolio value.

use crate::align::AlignedTable;
use crate::error::{FolioError, Result};
use crate::returns::{daily_returns, ReturnTable};
use crate::types::{
    validate_weights, AllocationSnapshot, PerformanceRecord, RebalancePeriod, TickerMap,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Inputs of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub tickers: Vec<String>,
    pub weights: Vec<f64>,
    pub benchmark: String,
    #[serde(default)]
    pub rebalance: RebalancePeriod,
}

/// Lifecycle of a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationState {
    Initialized,
    Running,
    Completed,
}

/// Output of a completed simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Cumulative portfolio and benchmark value per date.
    pub performance: Vec<PerformanceRecord>,
    /// Portfolio weights per date, after any rebalance on that date.
    pub allocations: Vec<AllocationSnapshot>,
    /// Dates on which the portfolio was reset to its target weights.
    pub rebalance_dates: Vec<NaiveDate>,
}

/// Mutable holdings during a run.
#[derive(Debug, Clone)]
struct PortfolioState {
    value: f64,
    allocation: Vec<f64>,
}

/// Row-by-row portfolio simulator.
pub struct PortfolioSimulator<'a> {
    table: &'a AlignedTable,
    returns: ReturnTable,
    config: &'a SimulationConfig,
    /// Target weights rescaled to sum to exactly one.
    weights: Vec<f64>,
    /// Return-table columns of the configured tickers.
    columns: Vec<usize>,
    benchmark_column: usize,
    state: SimulationState,
    portfolio: PortfolioState,
    benchmark_value: f64,
    last_rebalance: usize,
    result: SimulationResult,
}

impl<'a> PortfolioSimulator<'a> {
    /// Validate inputs and prepare a run.
    ///
    /// Fails when the weights do not match the tickers, when fewer than two
    /// dates are available, or when any ticker or the benchmark has no
    /// observation in the table.
    pub fn new(table: &'a AlignedTable, config: &'a SimulationConfig) -> Result<Self> {
        validate_weights(&config.tickers, &config.weights)?;

        if table.len() < 2 {
            return Err(FolioError::InsufficientData(format!(
                "need at least 2 aligned dates, got {}",
                table.len()
            )));
        }

        if table.observations(&config.benchmark) == 0 {
            return Err(FolioError::InsufficientData(format!(
                "benchmark {} has no observations",
                config.benchmark
            )));
        }

        let columns = config
            .tickers
            .iter()
            .map(|t| match table.column(t) {
                Some(c) if table.observations(t) > 0 => Ok(c),
                _ => Err(FolioError::MissingTicker(t.clone())),
            })
            .collect::<Result<Vec<usize>>>()?;

        let benchmark_column = table
            .column(&config.benchmark)
            .ok_or_else(|| FolioError::MissingTicker(config.benchmark.clone()))?;

        let total: f64 = config.weights.iter().sum();
        let weights: Vec<f64> = config.weights.iter().map(|w| w / total).collect();

        Ok(Self {
            table,
            returns: daily_returns(table),
            config,
            columns,
            benchmark_column,
            state: SimulationState::Initialized,
            portfolio: PortfolioState {
                value: 1.0,
                allocation: weights.clone(),
            },
            weights,
            benchmark_value: 1.0,
            last_rebalance: 0,
            result: SimulationResult {
                performance: Vec::with_capacity(table.len()),
                allocations: Vec::with_capacity(table.len()),
                rebalance_dates: Vec::new(),
            },
        })
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Replay every row and return the trajectories.
    pub fn run(mut self) -> SimulationResult {
        info!(
            "Simulating {} tickers over {} dates (rebalance: {})",
            self.config.tickers.len(),
            self.table.len(),
            self.config.rebalance
        );

        self.record(0);
        self.state = SimulationState::Running;
        debug!("Simulation state: {:?}", self.state);

        for t in 1..self.table.len() {
            self.step(t);
        }

        self.state = SimulationState::Completed;
        debug!(
            "Simulation state: {:?} (final value {:.6}, {} rebalances)",
            self.state,
            self.portfolio.value,
            self.result.rebalance_dates.len()
        );
        self.result
    }

    fn step(&mut self, t: usize) {
        let day = &self.returns.rows[t - 1];

        for (allocation, &column) in self.portfolio.allocation.iter_mut().zip(&self.columns) {
            if let Some(r) = day.value(column) {
                *allocation *= 1.0 + r;
            }
        }
        self.portfolio.value = self.portfolio.allocation.iter().sum();

        if let Some(r) = day.value(self.benchmark_column) {
            self.benchmark_value *= 1.0 + r;
        }

        if let Some(interval) = self.config.rebalance.interval_days() {
            if t - self.last_rebalance >= interval {
                let value = self.portfolio.value;
                for (allocation, weight) in self.portfolio.allocation.iter_mut().zip(&self.weights) {
                    *allocation = weight * value;
                }
                self.last_rebalance = t;
                let date = self.table.rows()[t].date;
                debug!("Rebalanced on {} at value {:.6}", date, value);
                self.result.rebalance_dates.push(date);
            }
        }

        self.record(t);
    }

    fn record(&mut self, t: usize) {
        let date = self.table.rows()[t].date;
        let value = self.portfolio.value;

        self.result.performance.push(PerformanceRecord {
            date,
            portfolio: value,
            benchmark: self.benchmark_value,
        });

        let weights: TickerMap<f64> = self
            .config
            .tickers
            .iter()
            .zip(&self.portfolio.allocation)
            .map(|(ticker, dollars)| {
                let weight = if value > 0.0 { dollars / value } else { 0.0 };
                (ticker.clone(), weight)
            })
            .collect();
        self.result
            .allocations
            .push(AllocationSnapshot { date, weights });
    }
}

/// Convenience wrapper: validate, run, and return the trajectories.
pub fn simulate(table: &AlignedTable, config: &SimulationConfig) -> Result<SimulationResult> {
    Ok(PortfolioSimulator::new(table, config)?.run())
}

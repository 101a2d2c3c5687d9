//! Command-line interface for backtests and allocation optimization.

use folio::analytics::ResultFormatter;
use folio::backtest::{run_backtest, run_optimization, BacktestRequest, OptimizationRequest};
use folio::config::FolioFileConfig;
use folio::data::{parse_date, CsvPriceSource};
use folio::error::{FolioError, Result};
use folio::types::{OptimizationModel, RebalancePeriod};

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Folio - portfolio backtesting and heuristic weight allocation.
#[derive(Parser)]
#[command(name = "folio")]
#[command(version)]
#[command(about = "Backtest a multi-asset portfolio and suggest new weights")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backtest a weighted portfolio against a benchmark
    Backtest {
        /// Directory with one <TICKER>.csv per instrument
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Comma-separated tickers
        #[arg(short, long, value_delimiter = ',', required = true)]
        tickers: Vec<String>,

        /// Comma-separated weights, one per ticker
        #[arg(short, long, value_delimiter = ',', required = true)]
        weights: Vec<f64>,

        /// Benchmark ticker
        #[arg(short, long, default_value = "SPY")]
        benchmark: String,

        /// First date (YYYY-MM-DD)
        #[arg(short, long, value_parser = parse_date_arg)]
        start: NaiveDate,

        /// Last date (YYYY-MM-DD), defaults to the end of the data
        #[arg(short, long, value_parser = parse_date_arg)]
        end: Option<NaiveDate>,

        /// Rebalance cadence
        #[arg(short, long, value_enum, default_value = "quarterly")]
        rebalance: RebalanceArg,
    },

    /// Suggest new weights for an existing portfolio
    Optimize {
        /// Directory with one <TICKER>.csv per instrument
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Comma-separated tickers
        #[arg(short, long, value_delimiter = ',', required = true)]
        tickers: Vec<String>,

        /// Comma-separated weights, one per ticker
        #[arg(short, long, value_delimiter = ',', required = true)]
        weights: Vec<f64>,

        /// Weighting model
        #[arg(short, long, value_enum, default_value = "risk-parity")]
        model: ModelArg,

        /// Comma-separated candidate tickers for suggestions
        #[arg(short, long, value_delimiter = ',')]
        universe: Vec<String>,

        /// First date (YYYY-MM-DD)
        #[arg(short, long, value_parser = parse_date_arg)]
        start: Option<NaiveDate>,

        /// Last date (YYYY-MM-DD)
        #[arg(short, long, value_parser = parse_date_arg)]
        end: Option<NaiveDate>,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long = "file", default_value = "folio.toml")]
        file: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum RebalanceArg {
    Monthly,
    Quarterly,
    Semiannually,
    Annually,
    None,
}

impl From<RebalanceArg> for RebalancePeriod {
    fn from(arg: RebalanceArg) -> Self {
        match arg {
            RebalanceArg::Monthly => RebalancePeriod::Monthly,
            RebalanceArg::Quarterly => RebalancePeriod::Quarterly,
            RebalanceArg::Semiannually => RebalancePeriod::Semiannually,
            RebalanceArg::Annually => RebalancePeriod::Annually,
            RebalanceArg::None => RebalancePeriod::None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    MeanVariance,
    MinVolatility,
    MaxSharpe,
    RiskParity,
    EqualWeight,
}

impl From<ModelArg> for OptimizationModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::MeanVariance => OptimizationModel::MeanVariance,
            ModelArg::MinVolatility => OptimizationModel::MinVolatility,
            ModelArg::MaxSharpe => OptimizationModel::MaxSharpe,
            ModelArg::RiskParity => OptimizationModel::RiskParity,
            ModelArg::EqualWeight => OptimizationModel::EqualWeight,
        }
    }
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(s, None).map_err(|e| e.to_string())
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Failed to set tracing subscriber: {}", e);
        }
    }

    fn file_config(&self) -> Result<FolioFileConfig> {
        match &self.config {
            Some(path) => FolioFileConfig::load(path),
            None => Ok(FolioFileConfig::default()),
        }
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Backtest {
            data,
            tickers,
            weights,
            benchmark,
            start,
            end,
            rebalance,
        } => {
            let file_config = cli.file_config()?;
            let source = price_source(data.as_deref(), &file_config)?;
            let request = BacktestRequest {
                tickers: tickers.clone(),
                weights: weights.clone(),
                benchmark: benchmark.clone(),
                start_date: *start,
                end_date: *end,
                rebalance_period: (*rebalance).into(),
            };
            let report = run_backtest(&request, &source, &file_config.to_analysis_config()?)?;

            match cli.output {
                OutputFormat::Text => ResultFormatter::print_backtest_report(&report),
                OutputFormat::Json => println!("{}", ResultFormatter::to_json(&report)?),
            }
            Ok(())
        }

        Commands::Optimize {
            data,
            tickers,
            weights,
            model,
            universe,
            start,
            end,
        } => {
            let file_config = cli.file_config()?;
            let source = price_source(data.as_deref(), &file_config)?;
            let request = OptimizationRequest {
                tickers: tickers.clone(),
                weights: weights.clone(),
                model: (*model).into(),
                universe: (!universe.is_empty()).then(|| universe.clone()),
                start_date: *start,
                end_date: *end,
            };
            let report =
                run_optimization(&request, &source, &file_config.to_analysis_config()?)?;

            match cli.output {
                OutputFormat::Text => ResultFormatter::print_optimization_report(&report),
                OutputFormat::Json => println!("{}", ResultFormatter::to_json(&report)?),
            }
            Ok(())
        }

        Commands::Init { file } => init_config(file),
    }
}

/// CSV source from the command line, falling back to the config file.
fn price_source(data: Option<&Path>, file_config: &FolioFileConfig) -> Result<CsvPriceSource> {
    let dir = match (data, &file_config.data.dir) {
        (Some(dir), _) => dir.to_path_buf(),
        (None, Some(dir)) => PathBuf::from(dir),
        (None, None) => {
            return Err(FolioError::ConfigError(
                "no data directory given; pass --data or set [data].dir".to_string(),
            ))
        }
    };
    info!("Reading price history from: {}", dir.display());
    Ok(CsvPriceSource::new(dir).with_config(file_config.data.to_data_config()?))
}

fn init_config(output: &Path) -> Result<()> {
    fs::write(output, FolioFileConfig::example())?;
    println!("Created example configuration file: {}", output.display());
    println!("\nEdit this file, then pass it to any command:");
    println!("  folio --config {} backtest --data data --tickers SPY,AGG --weights 0.6,0.4 --start 2020-01-01", output.display());
    Ok(())
}

//! Error types for the portfolio analysis core.

use thiserror::Error;

/// Main error type for backtests and allocation requests.
#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Input mismatch: {tickers} tickers but {weights} weights")]
    InputMismatch { tickers: usize, weights: usize },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No observations for ticker: {0}")]
    MissingTicker(String),

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParseError(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type alias for portfolio analysis operations.
pub type Result<T> = std::result::Result<T, FolioError>;

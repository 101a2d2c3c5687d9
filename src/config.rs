//! Configuration file support.
//!
//! Loads analysis settings from TOML so runs are reproducible.

use crate::backtest::AnalysisConfig;
use crate::data::DataConfig;
use crate::error::{FolioError, Result};
use crate::metrics::{
    MetricsConfig, VarianceDivisor, DEFAULT_RISK_FREE_RATE, DEFAULT_TRADING_DAYS,
    DEFAULT_VARIANCE_DIVISOR,
};
use crate::optimizer::OptimizerConfig;
use crate::returns::MissingDataPolicy;
use crate::rolling::DEFAULT_ROLLING_WINDOW;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolioFileConfig {
    /// Statistical settings.
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// Rolling window settings.
    #[serde(default)]
    pub rolling: RollingSettings,
    /// Return calculation settings.
    #[serde(default)]
    pub returns: ReturnSettings,
    /// Optimizer blend ratios and thresholds.
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// CSV data settings.
    #[serde(default)]
    pub data: DataSettings,
}

/// Statistical settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Annual risk-free rate as a fraction.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_trading_days")]
    pub trading_days_per_year: f64,
    /// "sample" (n - 1) or "population" (n).
    #[serde(default = "default_variance")]
    pub variance_divisor: VarianceDivisor,
}

fn default_risk_free_rate() -> f64 { DEFAULT_RISK_FREE_RATE }
fn default_trading_days() -> f64 { DEFAULT_TRADING_DAYS }
fn default_variance() -> VarianceDivisor { DEFAULT_VARIANCE_DIVISOR }

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            trading_days_per_year: DEFAULT_TRADING_DAYS,
            variance_divisor: DEFAULT_VARIANCE_DIVISOR,
        }
    }
}

/// Rolling window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSettings {
    /// Window length in trading days.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize { DEFAULT_ROLLING_WINDOW }

impl Default for RollingSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_ROLLING_WINDOW,
        }
    }
}

/// Return calculation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnSettings {
    /// "absent" or "carry_forward".
    #[serde(default)]
    pub missing_data: MissingDataPolicy,
}

/// CSV data settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSettings {
    /// Directory holding one `<TICKER>.csv` per instrument.
    pub dir: Option<String>,
    /// Date format in CSV.
    pub date_format: Option<String>,
    /// CSV delimiter; auto-detected when absent.
    pub delimiter: Option<char>,
    /// Skip malformed rows instead of failing.
    #[serde(default = "default_true")]
    pub skip_invalid: bool,
}

fn default_true() -> bool { true }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            dir: None,
            date_format: None,
            delimiter: None,
            skip_invalid: true,
        }
    }
}

impl DataSettings {
    /// Convert to the CSV loader's options.
    pub fn to_data_config(&self) -> Result<DataConfig> {
        let delimiter = match self.delimiter {
            Some(c) if c.is_ascii() => Some(c as u8),
            Some(c) => {
                return Err(FolioError::ConfigError(format!(
                    "delimiter must be a single ASCII character, got {:?}",
                    c
                )))
            }
            None => None,
        };
        Ok(DataConfig {
            date_format: self.date_format.clone(),
            delimiter,
            skip_invalid: self.skip_invalid,
        })
    }
}

impl FolioFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: FolioFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| FolioError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Convert to the typed settings used by backtests and optimization.
    pub fn to_analysis_config(&self) -> Result<AnalysisConfig> {
        if self.rolling.window < 2 {
            return Err(FolioError::ConfigError(format!(
                "rolling window must be at least 2, got {}",
                self.rolling.window
            )));
        }
        if !(self.metrics.trading_days_per_year > 0.0) {
            return Err(FolioError::ConfigError(format!(
                "trading_days_per_year must be positive, got {}",
                self.metrics.trading_days_per_year
            )));
        }
        self.optimizer.validate()?;

        Ok(AnalysisConfig {
            metrics: MetricsConfig {
                risk_free_rate: self.metrics.risk_free_rate,
                trading_days_per_year: self.metrics.trading_days_per_year,
                variance: self.metrics.variance_divisor,
            },
            rolling_window: self.rolling.window,
            missing_data: self.returns.missing_data,
            optimizer: self.optimizer.clone(),
        })
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Folio configuration file

[metrics]
risk_free_rate = 0.03
trading_days_per_year = 252.0
variance_divisor = "sample"     # or "population"

[rolling]
window = 30

[returns]
missing_data = "absent"         # or "carry_forward"

[optimizer]
# Share of the current weights kept when blending
mean_variance_blend = 0.3
min_volatility_blend = 0.4
max_sharpe_blend = 0.3
risk_parity_blend = 0.4
mean_variance_min_sharpe = 0.5
max_sharpe_min_sharpe = 0.8
min_candidate_return = 0.0
max_suggestions = 2
suggestion_weight = 0.10

[data]
# dir = "data"
# date_format = "%Y-%m-%d"
# delimiter = ","
skip_invalid = true
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = FolioFileConfig::default();
        assert_eq!(config.metrics.risk_free_rate, 0.03);
        assert_eq!(config.rolling.window, 30);
        assert_eq!(config.returns.missing_data, MissingDataPolicy::Absent);

        let analysis = config.to_analysis_config().unwrap();
        assert_eq!(analysis, AnalysisConfig::default());
    }

    #[test]
    fn test_load_config() {
        let toml_content = r#"
[metrics]
risk_free_rate = 0.02
variance_divisor = "population"

[rolling]
window = 60

[returns]
missing_data = "carry_forward"

[optimizer]
risk_parity_blend = 0.5
max_suggestions = 3

[data]
dir = "prices"
delimiter = ";"
"#;
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", toml_content).unwrap();

        let config = FolioFileConfig::load(file.path()).unwrap();
        assert_eq!(config.metrics.risk_free_rate, 0.02);
        assert_eq!(config.metrics.trading_days_per_year, 252.0);
        assert_eq!(config.metrics.variance_divisor, VarianceDivisor::Population);
        assert_eq!(config.rolling.window, 60);
        assert_eq!(config.returns.missing_data, MissingDataPolicy::CarryForward);
        assert_eq!(config.optimizer.risk_parity_blend, 0.5);
        assert_eq!(config.optimizer.max_sharpe_blend, 0.3);
        assert_eq!(config.optimizer.max_suggestions, 3);
        assert_eq!(config.data.dir.as_deref(), Some("prices"));

        let data = config.data.to_data_config().unwrap();
        assert_eq!(data.delimiter, Some(b';'));
        assert!(data.skip_invalid);
    }

    #[test]
    fn test_to_analysis_config() {
        let file_config = FolioFileConfig {
            metrics: MetricsSettings {
                risk_free_rate: 0.01,
                ..Default::default()
            },
            rolling: RollingSettings { window: 20 },
            ..Default::default()
        };

        let config = file_config.to_analysis_config().unwrap();
        assert_eq!(config.metrics.risk_free_rate, 0.01);
        assert_eq!(config.metrics.variance, VarianceDivisor::Sample);
        assert_eq!(config.rolling_window, 20);
    }

    #[test]
    fn test_invalid_config() {
        let bad_window = FolioFileConfig {
            rolling: RollingSettings { window: 1 },
            ..Default::default()
        };
        assert!(matches!(
            bad_window.to_analysis_config(),
            Err(FolioError::ConfigError(_))
        ));

        let bad_blend = FolioFileConfig {
            optimizer: OptimizerConfig {
                min_volatility_blend: -0.1,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(bad_blend.to_analysis_config().is_err());

        let bad_delimiter = DataSettings {
            delimiter: Some('§'),
            ..Default::default()
        };
        assert!(bad_delimiter.to_data_config().is_err());
    }

    #[test]
    fn test_save_config() {
        let config = FolioFileConfig {
            rolling: RollingSettings { window: 45 },
            ..Default::default()
        };
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        // Verify we can load it back
        let loaded = FolioFileConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_example_config() {
        let example = FolioFileConfig::example();
        for section in ["[metrics]", "[rolling]", "[returns]", "[optimizer]", "[data]"] {
            assert!(example.contains(section));
        }
        let parsed: FolioFileConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed, FolioFileConfig::default());
    }
}

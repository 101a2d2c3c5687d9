//! Price-history sources.
//!
//! The analysis core never fetches data itself: it asks a [`PriceHistory`]
//! collaborator for each ticker's observations and consumes whatever comes
//! back. Two sources are provided here, an in-memory map and a directory of
//! per-ticker CSV files.

use crate::error::{FolioError, Result};
use crate::types::PricePoint;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Supplies ordered (date, price) observations per ticker.
pub trait PriceHistory {
    /// Observations for `ticker` within the inclusive date range, oldest first.
    fn history(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PricePoint>>;
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}

/// Price history held in memory. Unknown tickers yield no observations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPrices {
    series: HashMap<String, Vec<PricePoint>>,
}

impl InMemoryPrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add observations for a ticker, appending to any already present.
    pub fn insert(&mut self, ticker: impl Into<String>, points: Vec<PricePoint>) {
        self.series.entry(ticker.into()).or_default().extend(points);
    }

    pub fn with_series(mut self, ticker: impl Into<String>, points: Vec<PricePoint>) -> Self {
        self.insert(ticker, points);
        self
    }

    pub fn tickers(&self) -> Vec<&str> {
        let mut tickers: Vec<&str> = self.series.keys().map(|s| s.as_str()).collect();
        tickers.sort();
        tickers
    }
}

impl PriceHistory for InMemoryPrices {
    fn history(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PricePoint>> {
        Ok(self
            .series
            .get(ticker)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| in_range(p.date, start, end))
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Raw CSV row; the adjusted close is preferred over the close.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(
        alias = "Date",
        alias = "DATE",
        alias = "Timestamp",
        alias = "timestamp",
        alias = "Datetime",
        alias = "datetime"
    )]
    date: String,
    #[serde(
        alias = "Adj Close",
        alias = "Adj_Close",
        alias = "adjclose",
        alias = "adjClose",
        alias = "Adjusted Close",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    adj_close: Option<f64>,
    #[serde(
        alias = "Close",
        alias = "c",
        alias = "Price",
        alias = "price",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    close: Option<f64>,
}

impl CsvRow {
    fn price(&self) -> Option<f64> {
        self.adj_close
            .filter(|p| p.is_finite())
            .or(self.close.filter(|p| p.is_finite()))
    }
}

/// CSV parsing options.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Date format string for parsing (e.g., "%Y-%m-%d").
    pub date_format: Option<String>,
    /// CSV delimiter. If None, the delimiter is auto-detected.
    pub delimiter: Option<u8>,
    /// Skip malformed rows instead of failing.
    pub skip_invalid: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            date_format: None,
            delimiter: None,
            skip_invalid: true,
        }
    }
}

/// Detect the delimiter from the first lines of a file.
///
/// Picks the candidate giving a consistent field count of at least two.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path)?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .take(5)
        .filter_map(|l| l.ok())
        .collect();

    if lines.is_empty() {
        return Ok(b',');
    }

    let mut best = (b',', 0usize);
    for delim in [b',', b'\t', b';', b'|'] {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.bytes().filter(|&b| b == delim).count() + 1)
            .collect();
        let consistent = counts.iter().all(|&c| c == counts[0]);
        if consistent && counts[0] >= 2 && counts[0] > best.1 {
            best = (delim, counts[0]);
        }
    }

    debug!("Detected delimiter {:?} ({} fields)", best.0 as char, best.1);
    Ok(best.0)
}

/// Parse a date, trying an explicit format first and then common layouts.
pub fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate> {
    let s = s.trim();

    if let Some(fmt) = format {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.date_naive());
    }

    Err(FolioError::DataError(format!("Could not parse date: '{}'", s)))
}

/// Load a single price history from a CSV file.
///
/// Rows without a numeric price are skipped; the result is sorted by date
/// with duplicates kept in file order.
pub fn load_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<Vec<PricePoint>> {
    let path = path.as_ref();
    info!("Loading prices from: {}", path.display());

    let delimiter = match config.delimiter {
        Some(d) => d,
        None => detect_delimiter(path)?,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;

    let mut points = Vec::new();
    let mut skipped = 0;

    for (row_num, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(r) => r,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(FolioError::CsvError(e)),
        };

        let date = match parse_date(&row.date, config.date_format.as_deref()) {
            Ok(d) => d,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        match row.price() {
            Some(price) => points.push(PricePoint::new(date, price)),
            None => {
                debug!("Skipping row {}: no numeric price", row_num + 1);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!("{}: skipped {} rows", path.display(), skipped);
    }

    // Stable sort keeps later duplicates after earlier ones.
    points.sort_by_key(|p| p.date);
    Ok(points)
}

/// Directory of `<TICKER>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    dir: PathBuf,
    config: DataConfig,
}

impl CsvPriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            config: DataConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DataConfig) -> Self {
        self.config = config;
        self
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker))
    }
}

impl PriceHistory for CsvPriceSource {
    fn history(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PricePoint>> {
        let path = self.path_for(ticker);
        if !path.exists() {
            return Err(FolioError::DataError(format!(
                "no price file for {}: {}",
                ticker,
                path.display()
            )));
        }
        let mut points = load_csv(&path, &self.config)?;
        points.retain(|p| in_range(p.date, start, end));
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-01-15", None).unwrap(), d(2024, 1, 15));
        assert_eq!(parse_date("2024/01/15", None).unwrap(), d(2024, 1, 15));
        assert_eq!(parse_date("01/15/2024", None).unwrap(), d(2024, 1, 15));
        assert_eq!(parse_date("2024-01-15 16:00:00", None).unwrap(), d(2024, 1, 15));
        assert_eq!(parse_date("15.01.2024", Some("%d.%m.%Y")).unwrap(), d(2024, 1, 15));
        assert!(parse_date("yesterday", None).is_err());
    }

    #[test]
    fn test_load_csv_prefers_adjusted_close() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Date,Open,High,Low,Close,Adj Close,Volume").unwrap();
        writeln!(file, "2024-01-03,10,11,9,10.5,10.0,100").unwrap();
        writeln!(file, "2024-01-02,10,11,9,10.2,,100").unwrap();
        writeln!(file, "2024-01-04,10,11,9,null,n/a,100").unwrap();
        writeln!(file, "not-a-date,10,11,9,10.2,10.1,100").unwrap();

        let points = load_csv(file.path(), &DataConfig::default()).unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0], PricePoint::new(d(2024, 1, 2), 10.2));
        assert_eq!(points[1], PricePoint::new(d(2024, 1, 3), 10.0));
    }

    #[test]
    fn test_load_csv_strict_mode_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "date,close").unwrap();
        writeln!(file, "garbage,1.0").unwrap();

        let config = DataConfig {
            skip_invalid: false,
            ..Default::default()
        };
        assert!(load_csv(file.path(), &config).is_err());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "date;price").unwrap();
        writeln!(file, "2024-01-02;5.0").unwrap();
        writeln!(file, "2024-01-03;5.5").unwrap();

        let points = load_csv(file.path(), &DataConfig::default()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].price, 5.5);
    }

    #[test]
    fn test_csv_source_filters_range() {
        let dir = TempDir::new().unwrap();
        let mut file = File::create(dir.path().join("SPY.csv")).unwrap();
        writeln!(file, "Date,Close").unwrap();
        for day in 1..=5 {
            writeln!(file, "2024-02-0{},{}", day, 400 + day).unwrap();
        }

        let source = CsvPriceSource::new(dir.path());
        let points = source
            .history("SPY", Some(d(2024, 2, 2)), Some(d(2024, 2, 4)))
            .unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].price, 402.0);

        assert!(matches!(
            source.history("QQQ", None, None),
            Err(FolioError::DataError(_))
        ));
    }

    #[test]
    fn test_in_memory_source() {
        let source = InMemoryPrices::new()
            .with_series("A", vec![PricePoint::new(d(2024, 1, 2), 1.0)])
            .with_series("A", vec![PricePoint::new(d(2024, 1, 3), 2.0)]);

        assert_eq!(source.history("A", None, None).unwrap().len(), 2);
        assert_eq!(source.history("A", Some(d(2024, 1, 3)), None).unwrap().len(), 1);
        assert!(source.history("B", None, None).unwrap().is_empty());
        assert_eq!(source.tickers(), vec!["A"]);
    }
}

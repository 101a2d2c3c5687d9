//! Multi-ticker time-series alignment.
//!
//! Merges sparse per-ticker price observations into one table with a row per
//! date in the union of all observation dates. Cells are left empty where a
//! ticker has no usable observation; nothing is forward-filled or zeroed.

use crate::types::PricePoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Prices for every ticker on a single date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    pub date: NaiveDate,
    /// One cell per ticker column, `None` where the ticker has no observation.
    pub prices: Vec<Option<f64>>,
}

impl AlignedRow {
    pub fn price(&self, column: usize) -> Option<f64> {
        self.prices.get(column).copied().flatten()
    }

    /// Check if every ticker has a price on this date.
    pub fn is_complete(&self) -> bool {
        self.prices.iter().all(|p| p.is_some())
    }
}

/// Date-ordered price table over a fixed set of ticker columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignedTable {
    tickers: Vec<String>,
    rows: Vec<AlignedRow>,
}

impl AlignedTable {
    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn rows(&self) -> &[AlignedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|r| r.date).collect()
    }

    /// Column index of a ticker.
    pub fn column(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Price of `ticker` at row `row`.
    pub fn price(&self, row: usize, ticker: &str) -> Option<f64> {
        let column = self.column(ticker)?;
        self.rows.get(row)?.price(column)
    }

    /// Number of dates on which `ticker` has a price.
    pub fn observations(&self, ticker: &str) -> usize {
        match self.column(ticker) {
            Some(column) => self
                .rows
                .iter()
                .filter(|r| r.price(column).is_some())
                .count(),
            None => 0,
        }
    }

    /// The observed (date, price) pairs of one ticker, in date order.
    pub fn series(&self, ticker: &str) -> Vec<PricePoint> {
        let Some(column) = self.column(ticker) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|r| r.price(column).map(|p| PricePoint::new(r.date, p)))
            .collect()
    }

    /// Keep only rows whose date falls in the inclusive `[start, end]` range.
    pub fn restrict(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> AlignedTable {
        let rows = self
            .rows
            .iter()
            .filter(|r| start.map_or(true, |s| r.date >= s) && end.map_or(true, |e| r.date <= e))
            .cloned()
            .collect();
        AlignedTable {
            tickers: self.tickers.clone(),
            rows,
        }
    }
}

/// Align multiple price series to the union of their dates.
///
/// # Arguments
/// * `series` - Slice of (ticker, observations) pairs; column order follows this slice
///
/// Observations with a non-finite or non-positive price are dropped. When a
/// ticker has several observations for the same date the last valid one wins.
/// A ticker listed more than once is merged into a single column.
pub fn align_series(series: &[(&str, &[PricePoint])]) -> AlignedTable {
    let mut tickers: Vec<String> = Vec::new();
    let mut columns: Vec<BTreeMap<NaiveDate, f64>> = Vec::new();

    for (ticker, points) in series {
        let column = match tickers.iter().position(|t| t == ticker) {
            Some(idx) => idx,
            None => {
                tickers.push(ticker.to_string());
                columns.push(BTreeMap::new());
                tickers.len() - 1
            }
        };

        let mut dropped = 0usize;
        for point in points.iter() {
            if point.is_valid() {
                columns[column].insert(point.date, point.price);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("{}: dropped {} unusable observations", ticker, dropped);
        }
    }

    let all_dates: BTreeSet<NaiveDate> = columns
        .iter()
        .flat_map(|c| c.keys().copied())
        .collect();

    let rows = all_dates
        .into_iter()
        .map(|date| AlignedRow {
            date,
            prices: columns.iter().map(|c| c.get(&date).copied()).collect(),
        })
        .collect();

    AlignedTable { tickers, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn points(data: &[(u32, f64)]) -> Vec<PricePoint> {
        data.iter().map(|(day, p)| PricePoint::new(d(*day), *p)).collect()
    }

    #[test]
    fn test_align_union_of_dates() {
        let a = points(&[(2, 100.0), (3, 101.0), (4, 102.0)]);
        let b = points(&[(2, 200.0), (4, 202.0), (5, 203.0)]);

        let table = align_series(&[("A", &a), ("B", &b)]);

        assert_eq!(table.tickers(), &["A".to_string(), "B".to_string()]);
        assert_eq!(table.dates(), vec![d(2), d(3), d(4), d(5)]);
        assert_eq!(table.price(1, "A"), Some(101.0));
        assert_eq!(table.price(1, "B"), None);
        assert_eq!(table.price(3, "A"), None);
        assert_eq!(table.price(3, "B"), Some(203.0));
        assert!(table.rows()[0].is_complete());
        assert!(!table.rows()[1].is_complete());
    }

    #[test]
    fn test_align_sorts_unordered_input() {
        let a = points(&[(5, 3.0), (2, 1.0), (3, 2.0)]);
        let table = align_series(&[("A", &a)]);
        assert_eq!(table.dates(), vec![d(2), d(3), d(5)]);
        assert_eq!(table.price(2, "A"), Some(3.0));
    }

    #[test]
    fn test_duplicate_date_last_wins() {
        let a = points(&[(2, 100.0), (2, 105.0), (3, 110.0)]);
        let table = align_series(&[("A", &a)]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.price(0, "A"), Some(105.0));
    }

    #[test]
    fn test_invalid_prices_are_omitted() {
        let a = points(&[(2, 100.0), (3, f64::NAN), (4, 0.0), (5, -1.0), (6, 104.0)]);
        let b = points(&[(3, 50.0), (4, 51.0), (5, 52.0)]);
        let table = align_series(&[("A", &a), ("B", &b)]);

        assert_eq!(table.len(), 5);
        assert_eq!(table.observations("A"), 2);
        assert_eq!(table.price(1, "A"), None);
        assert_eq!(table.price(2, "A"), None);
    }

    #[test]
    fn test_invalid_duplicate_does_not_erase_valid_value() {
        let a = points(&[(2, 100.0), (2, f64::NAN)]);
        let table = align_series(&[("A", &a)]);
        assert_eq!(table.price(0, "A"), Some(100.0));
    }

    #[test]
    fn test_repeated_ticker_merges() {
        let first = points(&[(2, 1.0), (3, 2.0)]);
        let second = points(&[(3, 2.5), (4, 3.0)]);
        let table = align_series(&[("A", &first), ("A", &second)]);

        assert_eq!(table.tickers().len(), 1);
        assert_eq!(table.observations("A"), 3);
        assert_eq!(table.price(1, "A"), Some(2.5));
    }

    #[test]
    fn test_restrict_and_series() {
        let a = points(&[(2, 1.0), (3, 2.0), (4, 3.0), (5, 4.0)]);
        let table = align_series(&[("A", &a)]);

        let restricted = table.restrict(Some(d(3)), Some(d(4)));
        assert_eq!(restricted.dates(), vec![d(3), d(4)]);

        let open_ended = table.restrict(Some(d(4)), None);
        assert_eq!(open_ended.len(), 2);

        let series = restricted.series("A");
        assert_eq!(series, points(&[(3, 2.0), (4, 3.0)]));
        assert!(table.series("ZZZ").is_empty());
        assert_eq!(table.observations("ZZZ"), 0);
    }

    #[test]
    fn test_empty_input() {
        let table = align_series(&[]);
        assert!(table.is_empty());
        assert!(table.tickers().is_empty());
    }
}

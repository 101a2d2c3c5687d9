//! Periodic and cumulative returns over an aligned price table.

use crate::align::AlignedTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Treatment of dates on which a ticker has no defined daily return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataPolicy {
    /// The cumulative cell is left empty for that date.
    #[default]
    Absent,
    /// The cumulative cell repeats the last known cumulative value.
    CarryForward,
}

/// Per-ticker values on a single date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRow {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

impl ReturnRow {
    pub fn value(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

/// Sparse per-ticker return table sharing the column layout of its source table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnTable {
    pub tickers: Vec<String>,
    pub rows: Vec<ReturnRow>,
}

impl ReturnTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn value(&self, row: usize, ticker: &str) -> Option<f64> {
        let column = self.column(ticker)?;
        self.rows.get(row)?.value(column)
    }

    /// All defined values of one ticker, in date order.
    pub fn defined(&self, ticker: &str) -> Vec<f64> {
        match self.column(ticker) {
            Some(column) => self.rows.iter().filter_map(|r| r.value(column)).collect(),
            None => Vec::new(),
        }
    }
}

/// Daily returns: one row per aligned date after the first.
///
/// A cell is defined only when the ticker is priced on both the date and
/// its predecessor row.
pub fn daily_returns(table: &AlignedTable) -> ReturnTable {
    let rows = table
        .rows()
        .windows(2)
        .map(|w| ReturnRow {
            date: w[1].date,
            values: (0..table.tickers().len())
                .map(|c| match (w[0].price(c), w[1].price(c)) {
                    (Some(prev), Some(curr)) => Some(curr / prev - 1.0),
                    _ => None,
                })
                .collect(),
        })
        .collect();

    ReturnTable {
        tickers: table.tickers().to_vec(),
        rows,
    }
}

/// Cumulative growth of one unit, one row per aligned date.
///
/// Row 0 holds 1.0 for every ticker priced on the first date. Compounding
/// resumes from the last defined value after a gap; what the gap cells hold
/// depends on `policy`.
pub fn cumulative_returns(
    table: &AlignedTable,
    daily: &ReturnTable,
    policy: MissingDataPolicy,
) -> ReturnTable {
    let columns = table.tickers().len();
    let mut rows = Vec::with_capacity(table.len());

    let Some(first) = table.rows().first() else {
        return ReturnTable {
            tickers: table.tickers().to_vec(),
            rows,
        };
    };

    // Running product per ticker; None until the ticker's first price.
    let mut running: Vec<Option<f64>> = (0..columns)
        .map(|c| first.price(c).map(|_| 1.0))
        .collect();
    rows.push(ReturnRow {
        date: first.date,
        values: running.clone(),
    });

    for (t, row) in table.rows().iter().enumerate().skip(1) {
        let day = &daily.rows[t - 1];
        let mut values = Vec::with_capacity(columns);
        for c in 0..columns {
            if running[c].is_none() && row.price(c).is_some() {
                running[c] = Some(1.0);
            }
            let cell = match (day.value(c), running[c]) {
                (Some(r), Some(acc)) => {
                    let next = acc * (1.0 + r);
                    running[c] = Some(next);
                    Some(next)
                }
                (None, Some(acc)) => match policy {
                    MissingDataPolicy::Absent => None,
                    MissingDataPolicy::CarryForward => Some(acc),
                },
                _ => None,
            };
            values.push(cell);
        }
        rows.push(ReturnRow {
            date: row.date,
            values,
        });
    }

    ReturnTable {
        tickers: table.tickers().to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align_series;
    use crate::types::PricePoint;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn points(data: &[(u32, f64)]) -> Vec<PricePoint> {
        data.iter().map(|(day, p)| PricePoint::new(d(*day), *p)).collect()
    }

    fn scenario_table() -> AlignedTable {
        let a = points(&[(2, 100.0), (3, 105.0), (4, 110.0)]);
        let b = points(&[(2, 50.0), (3, 49.0), (4, 52.0)]);
        align_series(&[("A", &a), ("B", &b)])
    }

    #[test]
    fn test_daily_returns_two_assets() {
        let returns = daily_returns(&scenario_table());

        assert_eq!(returns.len(), 2);
        assert!((returns.value(0, "A").unwrap() - 0.05).abs() < 1e-12);
        assert!((returns.value(1, "A").unwrap() - 0.047619047619).abs() < 1e-9);
        assert!((returns.value(0, "B").unwrap() + 0.02).abs() < 1e-12);
        assert!((returns.value(1, "B").unwrap() - 0.061224489796).abs() < 1e-9);
        assert_eq!(returns.rows[0].date, d(3));
    }

    #[test]
    fn test_daily_return_needs_both_prices() {
        let a = points(&[(2, 100.0), (3, 110.0), (5, 121.0)]);
        let b = points(&[(2, 10.0), (3, 11.0), (4, 12.0), (5, 13.0)]);
        let table = align_series(&[("A", &a), ("B", &b)]);
        let returns = daily_returns(&table);

        assert_eq!(returns.len(), 3);
        assert!(returns.value(0, "A").is_some());
        assert_eq!(returns.value(1, "A"), None);
        assert_eq!(returns.value(2, "A"), None);
        assert_eq!(returns.defined("B").len(), 3);
    }

    #[test]
    fn test_cumulative_absent_policy() {
        let a = points(&[(2, 100.0), (3, 110.0), (5, 121.0), (6, 133.1)]);
        let b = points(&[(2, 10.0), (3, 11.0), (4, 12.0), (5, 13.0), (6, 14.0)]);
        let table = align_series(&[("A", &a), ("B", &b)]);
        let daily = daily_returns(&table);
        let cumulative = cumulative_returns(&table, &daily, MissingDataPolicy::Absent);

        assert_eq!(cumulative.len(), table.len());
        assert_eq!(cumulative.value(0, "A"), Some(1.0));
        assert!((cumulative.value(1, "A").unwrap() - 1.1).abs() < 1e-12);
        assert_eq!(cumulative.value(2, "A"), None);
        assert_eq!(cumulative.value(3, "A"), None);
        // Compounding resumes from the last defined value.
        assert!((cumulative.value(4, "A").unwrap() - 1.21).abs() < 1e-9);
        assert!((cumulative.value(4, "B").unwrap() - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_cumulative_carry_forward_policy() {
        let a = points(&[(2, 100.0), (3, 110.0), (5, 121.0)]);
        let b = points(&[(2, 10.0), (3, 11.0), (4, 12.0), (5, 13.0)]);
        let table = align_series(&[("A", &a), ("B", &b)]);
        let daily = daily_returns(&table);
        let cumulative = cumulative_returns(&table, &daily, MissingDataPolicy::CarryForward);

        assert!((cumulative.value(2, "A").unwrap() - 1.1).abs() < 1e-12);
        assert!((cumulative.value(3, "A").unwrap() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_cumulative_late_starting_ticker() {
        let a = points(&[(2, 1.0), (3, 1.0), (4, 1.0)]);
        let b = points(&[(3, 20.0), (4, 22.0)]);
        let table = align_series(&[("A", &a), ("B", &b)]);
        let daily = daily_returns(&table);
        let cumulative = cumulative_returns(&table, &daily, MissingDataPolicy::CarryForward);

        assert_eq!(cumulative.value(0, "B"), None);
        // The first price starts the chain but has no return, so policy applies.
        assert_eq!(cumulative.value(1, "B"), Some(1.0));
        assert!((cumulative.value(2, "B").unwrap() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_cumulative_reproduces_daily() {
        let table = scenario_table();
        let daily = daily_returns(&table);
        let cumulative = cumulative_returns(&table, &daily, MissingDataPolicy::Absent);

        for ticker in ["A", "B"] {
            for t in 1..cumulative.len() {
                let prev = cumulative.value(t - 1, ticker).unwrap();
                let curr = cumulative.value(t, ticker).unwrap();
                let rebuilt = curr / prev - 1.0;
                assert!((rebuilt - daily.value(t - 1, ticker).unwrap()).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_empty_table() {
        let table = align_series(&[]);
        let daily = daily_returns(&table);
        let cumulative = cumulative_returns(&table, &daily, MissingDataPolicy::Absent);
        assert!(daily.is_empty());
        assert!(cumulative.is_empty());
    }
}

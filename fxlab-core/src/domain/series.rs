//! PriceSeries — validated, date-indexed OHLC history.
//!
//! Two constructors:
//! - `PriceSeries::new()` is strict and rejects any bar that would break an
//!   invariant (order, uniqueness, OHLC sanity).
//! - `PriceSeries::from_raw()` is the ingestion path: it sorts, drops weekend
//!   sessions and garbage rows, keeps the first of duplicate dates, and reports
//!   what it dropped.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bar::{Bar, RawBar};

/// Errors from strict series construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("price series is empty")]
    Empty,

    #[error("bars not in ascending date order at index {index}")]
    Unsorted { index: usize },

    #[error("duplicate bar for date {0}")]
    DuplicateDate(NaiveDate),

    #[error("invalid bar on {date}: {reason}")]
    InvalidBar { date: NaiveDate, reason: &'static str },
}

/// Counts of rows discarded by `PriceSeries::from_raw`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub input_rows: usize,
    pub weekend: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub kept: usize,
}

impl IngestReport {
    pub fn dropped(&self) -> usize {
        self.weekend + self.invalid + self.duplicates
    }
}

/// Immutable, ascending, duplicate-free sequence of sane bars.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series from bars that must already satisfy every invariant.
    pub fn new(bars: Vec<Bar>) -> Result<Self, SeriesError> {
        if bars.is_empty() {
            return Err(SeriesError::Empty);
        }
        for (i, bar) in bars.iter().enumerate() {
            if let Some(reason) = bar.violation() {
                return Err(SeriesError::InvalidBar {
                    date: bar.date,
                    reason,
                });
            }
            if i > 0 {
                let prev = bars[i - 1].date;
                if bar.date == prev {
                    return Err(SeriesError::DuplicateDate(bar.date));
                }
                if bar.date < prev {
                    return Err(SeriesError::Unsorted { index: i });
                }
            }
        }
        Ok(Self { bars })
    }

    /// Ingest raw rows: filter weekends and invalid rows, sort, dedupe.
    pub fn from_raw(rows: Vec<RawBar>) -> Result<(Self, IngestReport), SeriesError> {
        let mut report = IngestReport {
            input_rows: rows.len(),
            ..IngestReport::default()
        };

        let mut kept: Vec<Bar> = Vec::with_capacity(rows.len());
        for row in rows {
            if row.is_weekend() {
                report.weekend += 1;
            } else if row.violation().is_some() {
                report.invalid += 1;
            } else {
                kept.push(row);
            }
        }

        // Stable sort keeps input order among equal dates, so dedup keeps the first.
        kept.sort_by_key(|b| b.date);
        let before = kept.len();
        kept.dedup_by_key(|b| b.date);
        report.duplicates = before - kept.len();
        report.kept = kept.len();

        if report.dropped() > 0 {
            tracing::warn!(
                weekend = report.weekend,
                invalid = report.invalid,
                duplicates = report.duplicates,
                kept = report.kept,
                "dropped rows while building price series"
            );
        }

        Ok((Self::new(kept)?, report))
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    /// O(log n) date lookup.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.bars[0].date
    }

    pub fn last_date(&self) -> NaiveDate {
        self.bars[self.bars.len() - 1].date
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.bars.iter().map(|b| b.close)
    }

    /// Deterministic BLAKE3 hash over dates and OHLC values.
    pub fn dataset_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for bar in &self.bars {
            hasher.update(bar.date.to_string().as_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

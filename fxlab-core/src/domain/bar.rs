//! Bar — the fundamental market data unit.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Daily OHLC bar for one trading session.
///
/// Volume is optional: FX feeds frequently carry none, or a tick count that
/// nothing downstream relies on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Raw OHLC record as parsed from an input source, before filtering.
pub type RawBar = Bar;

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// `low <= min(open, close) <= max(open, close) <= high`, all prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.low > 0.0
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Describe the first invariant this bar violates, if any.
    pub(crate) fn violation(&self) -> Option<&'static str> {
        if self.is_void() {
            Some("non-finite price")
        } else if self.low <= 0.0 || self.open <= 0.0 || self.close <= 0.0 {
            Some("non-positive price")
        } else if !self.is_sane() {
            Some("OHLC ordering violated")
        } else {
            None
        }
    }
}

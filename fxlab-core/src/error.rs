//! Errors raised by labeling and trade simulation.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LabelError {
    /// A configuration value is outside its allowed set or bounds.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The entry day lacks the bars needed to resolve it. Callers skip the day.
    #[error("insufficient history for {date}: {reason}")]
    InsufficientHistory { date: NaiveDate, reason: &'static str },

    #[error("date {0} not present in price series")]
    UnknownDate(NaiveDate),
}

impl LabelError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// True for coverage gaps that should skip a row rather than abort a run.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::InsufficientHistory { .. } | Self::UnknownDate(_))
    }
}

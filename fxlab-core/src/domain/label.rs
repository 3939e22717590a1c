//! Labels and the labeled dataset row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::bar::Bar;
use super::trade::{ExitReason, Side};

/// Trade-outcome label for one signal day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Up,
    Down,
    Neutral,
}

impl Label {
    /// Direction implied by the label; `None` iff neutral.
    pub fn direction(self) -> Option<Side> {
        match self {
            Label::Up => Some(Side::Long),
            Label::Down => Some(Side::Short),
            Label::Neutral => None,
        }
    }

    pub fn from_side(side: Side) -> Self {
        match side {
            Side::Long => Label::Up,
            Side::Short => Label::Down,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Up => "up",
            Label::Down => "down",
            Label::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "1" => Ok(Label::Up),
            "down" | "-1" => Ok(Label::Down),
            "neutral" | "0" => Ok(Label::Neutral),
            other => Err(format!("unknown label '{other}'")),
        }
    }
}

/// One row of the canonical labeled dataset.
///
/// `exit_date`, `exit_reason` and `hit_offset` are present iff the label is
/// directional. `lookahead_return` is the label-independent reference
/// `close[t+h] / close[t] - 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledBar {
    pub bar: Bar,
    pub label: Label,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
    pub exit_reason: Option<ExitReason>,
    pub hit_offset: Option<usize>,
    pub lookahead_return: f64,
}

impl LabeledBar {
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }
}

//! TradeOutcome — result of simulating one hypothetical position.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("long"),
            Side::Short => f.write_str("short"),
        }
    }
}

/// Why a simulated position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Tp,
    Sl,
    Horizon,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::Tp => "tp",
            ExitReason::Sl => "sl",
            ExitReason::Horizon => "horizon",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable result of one simulated position.
///
/// `realized_return` is the return to the position holder: positive is a
/// profit for either side. TP and SL exits book the exact threshold, not the
/// touched price, so backtest P&L is reproducible from the parameters alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub signal_date: NaiveDate,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub side: Side,
    pub exit_date: NaiveDate,
    pub exit_index: usize,
    pub exit_reason: ExitReason,
    /// Bars from the signal day to the exit bar.
    pub hit_offset: usize,
    pub realized_return: f64,
    /// Effective stop distance as a fraction of entry; `None` when no stop applied.
    pub stop_pct: Option<f64>,
}

impl TradeOutcome {
    pub fn is_take_profit(&self) -> bool {
        self.exit_reason == ExitReason::Tp
    }

    pub fn is_winner(&self) -> bool {
        self.realized_return > 0.0
    }
}

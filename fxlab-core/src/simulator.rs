//! Trade outcome simulation — the single source of truth for TP/SL/horizon exits.
//!
//! A hypothetical position opened on signal day `t` is tracked over the bars
//! `t+1 ..= t+horizon_days`. With `entry = close` the entry bar is `t` itself;
//! with `entry = next_open` the entry bar is `t+1`, which is also the first
//! scanned bar. The first bar that resolves to a take-profit or stop-loss ends
//! the scan. If neither triggers, the position closes at the last window bar.
//!
//! Labeling and every backtest variant go through `TradeSimulator::simulate_with`;
//! the only knob that differs between them is whether the stop is enabled.

use chrono::NaiveDate;

use crate::domain::{Bar, ExitReason, PriceSeries, Side, TradeOutcome};
use crate::error::LabelError;
use crate::indicators::atr_sma;
use crate::params::{EntryMode, LabelParams, StopRule, TieBreaker};

/// Simulator bound to one series and one parameter set.
///
/// Precomputes ATR once when the stop rule needs it, so per-day simulation
/// is O(horizon).
#[derive(Debug, Clone)]
pub struct TradeSimulator<'a> {
    series: &'a PriceSeries,
    params: LabelParams,
    atr: Option<Vec<f64>>,
}

impl<'a> TradeSimulator<'a> {
    pub fn new(series: &'a PriceSeries, params: LabelParams) -> Self {
        let atr = params
            .stop()
            .atr_window()
            .map(|window| atr_sma(series.bars(), window));
        Self {
            series,
            params,
            atr,
        }
    }

    pub fn params(&self) -> &LabelParams {
        &self.params
    }

    pub fn series(&self) -> &PriceSeries {
        self.series
    }

    /// Last bar index of the horizon window, if the whole window exists.
    pub fn window_end(&self, signal_idx: usize) -> Option<usize> {
        let end = signal_idx + self.params.horizon_days();
        (end < self.series.len()).then_some(end)
    }

    /// Simulate with the stop rule from the parameters.
    pub fn simulate_at(&self, signal_idx: usize, side: Side) -> Result<TradeOutcome, LabelError> {
        self.simulate_with(signal_idx, side, true)
    }

    /// Simulate one position. `stop_enabled = false` ignores the stop rule.
    pub fn simulate_with(
        &self,
        signal_idx: usize,
        side: Side,
        stop_enabled: bool,
    ) -> Result<TradeOutcome, LabelError> {
        let bars = self.series.bars();
        let signal_bar = bars.get(signal_idx).ok_or(LabelError::InsufficientHistory {
            date: self.series.last_date(),
            reason: "signal index beyond series end",
        })?;
        let signal_date = signal_bar.date;

        let end = self
            .window_end(signal_idx)
            .ok_or(LabelError::InsufficientHistory {
                date: signal_date,
                reason: "horizon window extends past series end",
            })?;

        // horizon_days >= 1 guarantees signal_idx + 1 <= end.
        let (entry_idx, entry_price) = match self.params.entry() {
            EntryMode::Close => (signal_idx, signal_bar.close),
            EntryMode::NextOpen => (signal_idx + 1, bars[signal_idx + 1].open),
        };

        let stop_pct = if stop_enabled {
            self.stop_pct(signal_idx, signal_date, entry_price)?
        } else {
            None
        };

        let levels = Levels::new(side, entry_price, self.params.tp_pct(), stop_pct);
        let tie = self.params.tie_breaker();

        let outcome = |exit_index: usize, exit_reason: ExitReason, realized_return: f64| {
            TradeOutcome {
                signal_date,
                entry_date: bars[entry_idx].date,
                entry_price,
                side,
                exit_date: bars[exit_index].date,
                exit_index,
                exit_reason,
                hit_offset: exit_index - signal_idx,
                realized_return,
                stop_pct,
            }
        };

        for (i, bar) in bars.iter().enumerate().take(end + 1).skip(signal_idx + 1) {
            if let Some(reason) = levels.resolve(bar, tie) {
                let ret = match reason {
                    ExitReason::Tp => self.params.tp_pct(),
                    // resolve() only reports Sl when a stop level exists.
                    _ => -stop_pct.unwrap_or(0.0),
                };
                return Ok(outcome(i, reason, ret));
            }
        }

        let exit_close = bars[end].close;
        let ret = side.sign() * (exit_close - entry_price) / entry_price;
        Ok(outcome(end, ExitReason::Horizon, ret))
    }

    /// Effective stop distance as a fraction of entry price.
    fn stop_pct(
        &self,
        signal_idx: usize,
        date: NaiveDate,
        entry_price: f64,
    ) -> Result<Option<f64>, LabelError> {
        match self.params.stop() {
            StopRule::None => Ok(None),
            StopRule::FixedPct { pct } => Ok(Some(pct)),
            StopRule::Atr { mult, .. } => {
                let atr = self
                    .atr
                    .as_ref()
                    .and_then(|v| v.get(signal_idx).copied())
                    .unwrap_or(f64::NAN);
                if atr.is_nan() {
                    return Err(LabelError::InsufficientHistory {
                        date,
                        reason: "ATR window not yet filled",
                    });
                }
                Ok(Some(mult * atr / entry_price))
            }
        }
    }
}

/// Price levels for one position.
#[derive(Debug, Clone, Copy)]
struct Levels {
    side: Side,
    take_profit: f64,
    stop: Option<f64>,
}

impl Levels {
    fn new(side: Side, entry: f64, tp_pct: f64, stop_pct: Option<f64>) -> Self {
        match side {
            Side::Long => Self {
                side,
                take_profit: entry * (1.0 + tp_pct),
                stop: stop_pct.map(|s| entry * (1.0 - s)),
            },
            Side::Short => Self {
                side,
                take_profit: entry * (1.0 - tp_pct),
                stop: stop_pct.map(|s| entry * (1.0 + s)),
            },
        }
    }

    /// Exit triggered on this bar, if any. Same-bar TP+SL goes to the tie-breaker.
    fn resolve(&self, bar: &Bar, tie: TieBreaker) -> Option<ExitReason> {
        let (tp_hit, sl_hit) = match self.side {
            Side::Long => (
                bar.high >= self.take_profit,
                self.stop.is_some_and(|s| bar.low <= s),
            ),
            Side::Short => (
                bar.low <= self.take_profit,
                self.stop.is_some_and(|s| bar.high >= s),
            ),
        };

        match (tp_hit, sl_hit) {
            (true, true) => Some(match tie {
                TieBreaker::Stop => ExitReason::Sl,
                TieBreaker::Tp => ExitReason::Tp,
            }),
            (true, false) => Some(ExitReason::Tp),
            (false, true) => Some(ExitReason::Sl),
            (false, false) => None,
        }
    }
}

/// Simulate a single position opened on `signal_date`.
///
/// Convenience wrapper over `TradeSimulator`; prefer the struct when simulating
/// many days against the same series.
pub fn simulate(
    series: &PriceSeries,
    signal_date: NaiveDate,
    side: Side,
    params: &LabelParams,
) -> Result<TradeOutcome, LabelError> {
    let idx = series
        .index_of(signal_date)
        .ok_or(LabelError::UnknownDate(signal_date))?;
    TradeSimulator::new(series, *params).simulate_at(idx, side)
}

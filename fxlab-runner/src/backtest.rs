//! Backtest engine — replays predictions through a stake/settlement policy.
//!
//! Every directional prediction day opens one hypothetical position, scored by
//! the same `TradeSimulator` the labeler uses. The policy only decides:
//! - whether the stop is live (`SlTp`) or ignored (`TpOnly`),
//! - how big the stake is (fixed or a fraction of current capital),
//! - when P&L reaches capital (signal day or exit day).
//!
//! Exit-settled P&L sits in `CapitalState::pending` until its exit date, so a
//! new stake is sized from realized capital only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fxlab_core::{
    ExitReason, Label, LabelError, LabelParams, PriceSeries, Side, TradeOutcome, TradeSimulator,
};

use crate::metrics;
use crate::predictions::PredictionRow;

/// Errors from backtest setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("label parameters: {0}")]
    Label(#[from] LabelError),

    #[error("invalid backtest parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> BacktestError {
    BacktestError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

// ─── Policy ──────────────────────────────────────────────────────────

/// How much capital each trade risks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StakeStrategy {
    /// Constant amount per trade (strategy A).
    Fixed { stake: f64 },
    /// `frac_capital * current_capital` per trade (strategy B, compounding).
    Fractional { frac_capital: f64 },
}

impl StakeStrategy {
    pub fn stake(&self, capital: f64) -> f64 {
        match *self {
            StakeStrategy::Fixed { stake } => stake,
            StakeStrategy::Fractional { frac_capital } => (frac_capital * capital).max(0.0),
        }
    }
}

/// When a trade's P&L is credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// On the signal day.
    Immediate,
    /// On the simulated exit date.
    AtExit,
}

/// Which exits a trade may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnConvention {
    /// Stop-loss live.
    SlTp,
    /// No stop: TP or horizon close.
    TpOnly,
}

impl ReturnConvention {
    pub fn stop_enabled(self) -> bool {
        matches!(self, ReturnConvention::SlTp)
    }
}

/// Scoring of a directional trade on a day whose true label is neutral.
/// Only consulted under `SlTp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralDayRule {
    /// Book a full stop-loss, exiting at the end of the horizon window.
    AutoStop,
    /// Simulate the bars like any other day.
    Simulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestPolicy {
    pub start_capital: f64,
    pub strategy: StakeStrategy,
    pub settlement: Settlement,
    pub convention: ReturnConvention,
    pub neutral_day: NeutralDayRule,
    /// Multiplier on every realized return.
    pub leverage: f64,
}

impl Default for BacktestPolicy {
    fn default() -> Self {
        Self {
            start_capital: 10_000.0,
            strategy: StakeStrategy::Fixed { stake: 1_000.0 },
            settlement: Settlement::Immediate,
            convention: ReturnConvention::SlTp,
            neutral_day: NeutralDayRule::AutoStop,
            leverage: 1.0,
        }
    }
}

impl BacktestPolicy {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !(self.start_capital > 0.0 && self.start_capital.is_finite()) {
            return Err(invalid(
                "start_capital",
                format!("must be > 0, got {}", self.start_capital),
            ));
        }
        match self.strategy {
            StakeStrategy::Fixed { stake } if !(stake > 0.0 && stake.is_finite()) => {
                return Err(invalid("stake", format!("must be > 0, got {stake}")));
            }
            StakeStrategy::Fractional { frac_capital }
                if !(frac_capital > 0.0 && frac_capital <= 1.0) =>
            {
                return Err(invalid(
                    "frac_capital",
                    format!("must be in (0, 1], got {frac_capital}"),
                ));
            }
            _ => {}
        }
        if !(self.leverage > 0.0 && self.leverage.is_finite()) {
            return Err(invalid("leverage", format!("must be > 0, got {}", self.leverage)));
        }
        Ok(())
    }
}

// ─── Capital state ───────────────────────────────────────────────────

/// Running capital plus P&L waiting for its booking date.
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalState {
    capital: f64,
    pending: BTreeMap<NaiveDate, Vec<f64>>,
}

impl CapitalState {
    pub fn new(start_capital: f64) -> Self {
        Self {
            capital: start_capital,
            pending: BTreeMap::new(),
        }
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn pending_trades(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn next_pending_date(&self) -> Option<NaiveDate> {
        self.pending.keys().next().copied()
    }

    /// Credit P&L now.
    pub fn book(&mut self, pnl: f64) {
        self.capital += pnl;
    }

    /// Credit P&L on `date`.
    pub fn defer(&mut self, date: NaiveDate, pnl: f64) {
        self.pending.entry(date).or_default().push(pnl);
    }

    /// Book everything maturing on or before `date`. Returns `(pnl, trades)`.
    pub fn settle_through(&mut self, date: NaiveDate) -> (f64, usize) {
        let later = match date.succ_opt() {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.pending, later);

        let mut pnl = 0.0;
        let mut count = 0usize;
        for amounts in due.into_values() {
            for amount in amounts {
                self.capital += amount;
                pnl += amount;
                count += 1;
            }
        }
        (pnl, count)
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// One opened position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub signal_date: NaiveDate,
    pub side: Side,
    pub label_true: Label,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_reason: ExitReason,
    pub stake: f64,
    /// Position return before leverage.
    pub realized_return: f64,
    pub pnl: f64,
    /// Date the P&L reached capital.
    pub booked_on: NaiveDate,
    /// Scored as a stop-out because the true label was neutral.
    pub auto_stopped: bool,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Capital after one day's settlements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalPoint {
    pub date: NaiveDate,
    pub capital_after: f64,
    /// P&L credited on this date.
    pub pnl: f64,
    pub opened: bool,
    pub settled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub start_capital: f64,
    pub final_capital: f64,
    pub total_pnl: f64,
    /// `total_pnl / start_capital`.
    pub total_return: f64,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_consecutive_losses: usize,
    /// Largest peak-to-trough decline as a negative fraction.
    pub max_drawdown: f64,
    pub skipped_predictions: usize,
}

impl BacktestSummary {
    fn compute(
        start_capital: f64,
        points: &[CapitalPoint],
        trades: &[TradeRecord],
        skipped_predictions: usize,
    ) -> Self {
        let final_capital = points.last().map_or(start_capital, |p| p.capital_after);
        let curve = capital_curve(start_capital, points);
        Self {
            start_capital,
            final_capital,
            total_pnl: points.iter().map(|p| p.pnl).sum(),
            total_return: metrics::total_return(&curve),
            trades: trades.len(),
            wins: trades.iter().filter(|t| t.pnl > 0.0).count(),
            losses: trades.iter().filter(|t| t.pnl < 0.0).count(),
            win_rate: metrics::win_rate(trades),
            profit_factor: metrics::profit_factor(trades),
            max_consecutive_losses: metrics::max_consecutive_losses(trades),
            max_drawdown: metrics::max_drawdown(&curve),
            skipped_predictions,
        }
    }
}

fn capital_curve(start_capital: f64, points: &[CapitalPoint]) -> Vec<f64> {
    std::iter::once(start_capital)
        .chain(points.iter().map(|p| p.capital_after))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub policy: BacktestPolicy,
    pub points: Vec<CapitalPoint>,
    pub trades: Vec<TradeRecord>,
    pub summary: BacktestSummary,
}

impl BacktestResult {
    /// Start capital followed by capital after each point.
    pub fn capital_curve(&self) -> Vec<f64> {
        capital_curve(self.policy.start_capital, &self.points)
    }

    /// Rescale a fixed-stake run by `leverage` without re-simulating.
    ///
    /// With a fixed stake, P&L is linear in leverage, so every trade and every
    /// day scales by the same factor and capital is re-accumulated. Fractional
    /// runs compound and are rejected.
    pub fn with_leverage(&self, leverage: f64) -> Result<Self, BacktestError> {
        if !matches!(self.policy.strategy, StakeStrategy::Fixed { .. }) {
            return Err(invalid(
                "leverage",
                "post-hoc leverage requires a fixed stake strategy",
            ));
        }
        if !(leverage > 0.0 && leverage.is_finite()) {
            return Err(invalid("leverage", format!("must be > 0, got {leverage}")));
        }

        let mut policy = self.policy;
        policy.leverage *= leverage;

        let trades: Vec<TradeRecord> = self
            .trades
            .iter()
            .map(|t| TradeRecord {
                pnl: t.pnl * leverage,
                ..t.clone()
            })
            .collect();

        let mut capital = policy.start_capital;
        let points: Vec<CapitalPoint> = self
            .points
            .iter()
            .map(|p| {
                let pnl = p.pnl * leverage;
                capital += pnl;
                CapitalPoint {
                    pnl,
                    capital_after: capital,
                    ..*p
                }
            })
            .collect();

        let summary = BacktestSummary::compute(
            policy.start_capital,
            &points,
            &trades,
            self.summary.skipped_predictions,
        );
        Ok(Self {
            policy,
            points,
            trades,
            summary,
        })
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct BacktestEngine<'a> {
    sim: TradeSimulator<'a>,
    policy: BacktestPolicy,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(
        series: &'a PriceSeries,
        params: LabelParams,
        policy: BacktestPolicy,
    ) -> Result<Self, BacktestError> {
        policy.validate()?;
        if policy.convention.stop_enabled() && !params.stop().is_enabled() {
            return Err(invalid(
                "convention",
                "sl_tp needs a stop-loss rule; use tp_only or set sl_mode",
            ));
        }
        Ok(Self {
            sim: TradeSimulator::new(series, params),
            policy,
        })
    }

    pub fn policy(&self) -> &BacktestPolicy {
        &self.policy
    }

    /// Replay `predictions` (any order; processed by date).
    pub fn run(&self, predictions: &[PredictionRow]) -> BacktestResult {
        let mut rows: Vec<&PredictionRow> = predictions.iter().collect();
        rows.sort_by_key(|r| r.date);

        let mut state = CapitalState::new(self.policy.start_capital);
        let mut points = Vec::with_capacity(rows.len());
        let mut trades = Vec::new();
        let mut skipped = 0usize;

        for row in rows {
            // Exits maturing on days without a prediction row get their own point.
            flush_pending(&mut state, &mut points, Some(row.date));
            let (mut day_pnl, settled) = state.settle_through(row.date);
            let mut opened = false;

            if let Some(side) = row.combined_pred.direction() {
                match self.open_trade(row, side, state.capital()) {
                    Ok(trade) => {
                        opened = true;
                        match self.policy.settlement {
                            Settlement::Immediate => {
                                state.book(trade.pnl);
                                day_pnl += trade.pnl;
                            }
                            Settlement::AtExit => state.defer(trade.exit_date, trade.pnl),
                        }
                        trades.push(trade);
                    }
                    Err(e) => {
                        tracing::debug!(date = %row.date, error = %e, "skipping prediction");
                        skipped += 1;
                    }
                }
            }

            points.push(CapitalPoint {
                date: row.date,
                capital_after: state.capital(),
                pnl: day_pnl,
                opened,
                settled,
            });
        }

        // Positions still open after the last prediction day.
        flush_pending(&mut state, &mut points, None);

        if skipped > 0 {
            tracing::warn!(skipped, "predictions without a full price window were skipped");
        }

        let summary =
            BacktestSummary::compute(self.policy.start_capital, &points, &trades, skipped);
        tracing::info!(
            trades = summary.trades,
            wins = summary.wins,
            losses = summary.losses,
            final_capital = summary.final_capital,
            max_drawdown = summary.max_drawdown,
            "backtest complete"
        );

        BacktestResult {
            policy: self.policy,
            points,
            trades,
            summary,
        }
    }

    fn open_trade(
        &self,
        row: &PredictionRow,
        side: Side,
        capital: f64,
    ) -> Result<TradeRecord, LabelError> {
        let series = self.sim.series();
        let idx = series
            .index_of(row.date)
            .ok_or(LabelError::UnknownDate(row.date))?;

        let stop_enabled = self.policy.convention.stop_enabled();
        let mut outcome = self.sim.simulate_with(idx, side, stop_enabled)?;

        let auto_stopped = stop_enabled
            && row.label_true == Label::Neutral
            && self.policy.neutral_day == NeutralDayRule::AutoStop;
        if auto_stopped {
            outcome = auto_stop(&outcome, idx, self.sim.window_end(idx), series);
        }

        let stake = self.policy.strategy.stake(capital);
        let pnl = stake * outcome.realized_return * self.policy.leverage;
        let booked_on = match self.policy.settlement {
            Settlement::Immediate => row.date,
            Settlement::AtExit => outcome.exit_date,
        };

        Ok(TradeRecord {
            signal_date: row.date,
            side,
            label_true: row.label_true,
            entry_date: outcome.entry_date,
            entry_price: outcome.entry_price,
            exit_date: outcome.exit_date,
            exit_reason: outcome.exit_reason,
            stake,
            realized_return: outcome.realized_return,
            pnl,
            booked_on,
            auto_stopped,
        })
    }
}

/// Settle pending dates strictly before `until` (all of them when `None`),
/// one point per booking date.
fn flush_pending(
    state: &mut CapitalState,
    points: &mut Vec<CapitalPoint>,
    until: Option<NaiveDate>,
) {
    while let Some(date) = state.next_pending_date() {
        if until.is_some_and(|u| date >= u) {
            break;
        }
        let (pnl, settled) = state.settle_through(date);
        points.push(CapitalPoint {
            date,
            capital_after: state.capital(),
            pnl,
            opened: false,
            settled,
        });
    }
}

/// Rewrite an outcome as a full stop-out at the end of its horizon window.
fn auto_stop(
    outcome: &TradeOutcome,
    signal_idx: usize,
    window_end: Option<usize>,
    series: &PriceSeries,
) -> TradeOutcome {
    let end = window_end.unwrap_or(outcome.exit_index);
    let exit_date = series.get(end).map_or(outcome.exit_date, |b| b.date);
    TradeOutcome {
        exit_date,
        exit_index: end,
        exit_reason: ExitReason::Sl,
        hit_offset: end - signal_idx,
        realized_return: -outcome.stop_pct.unwrap_or(0.0),
        ..*outcome
    }
}

/// Run a backtest in one call.
pub fn run_backtest(
    predictions: &[PredictionRow],
    series: &PriceSeries,
    params: LabelParams,
    policy: BacktestPolicy,
) -> Result<BacktestResult, BacktestError> {
    Ok(BacktestEngine::new(series, params, policy)?.run(predictions))
}

//! Labeler — turns a price series into the canonical labeled dataset.
//!
//! Every admissible signal day is simulated twice, once long and once short.
//! Only a take-profit produces a directional label; a stop-out or a horizon
//! close on one side simply contributes nothing. When both sides take profit,
//! the earlier hit wins and a same-bar tie goes to the conflict policy.

use serde::{Deserialize, Serialize};

use crate::domain::{Label, LabeledBar, PriceSeries, Side, TradeOutcome};
use crate::params::{ConflictPolicy, LabelParams};
use crate::simulator::TradeSimulator;

/// Aggregate counts for one labeling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    pub neutral: usize,
    /// Days where both sides took profit on the same bar.
    pub same_bar_conflicts: usize,
    /// Mean hit offset over directional rows (0.0 when there are none).
    pub mean_hit_offset: f64,
}

impl LabelStats {
    pub fn from_rows(rows: &[LabeledBar], same_bar_conflicts: usize) -> Self {
        let mut stats = Self {
            total: rows.len(),
            same_bar_conflicts,
            ..Self::default()
        };
        let mut offset_sum = 0usize;
        for row in rows {
            match row.label {
                Label::Up => stats.up += 1,
                Label::Down => stats.down += 1,
                Label::Neutral => stats.neutral += 1,
            }
            offset_sum += row.hit_offset.unwrap_or(0);
        }
        let directional = stats.up + stats.down;
        if directional > 0 {
            stats.mean_hit_offset = offset_sum as f64 / directional as f64;
        }
        stats
    }

    /// Fraction of rows carrying `label`.
    pub fn share(&self, label: Label) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let count = match label {
            Label::Up => self.up,
            Label::Down => self.down,
            Label::Neutral => self.neutral,
        };
        count as f64 / self.total as f64
    }
}

/// Output of one labeling run.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRun {
    pub rows: Vec<LabeledBar>,
    /// Signal days excluded for lack of history (window or ATR).
    pub skipped: usize,
    pub stats: LabelStats,
}

/// Drives the simulator over every signal day.
#[derive(Debug, Clone, Copy)]
pub struct Labeler {
    params: LabelParams,
}

impl Labeler {
    pub fn new(params: LabelParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LabelParams {
        &self.params
    }

    pub fn label(&self, series: &PriceSeries) -> LabelRun {
        let sim = TradeSimulator::new(series, self.params);
        let bars = series.bars();
        let h = self.params.horizon_days();

        let mut rows = Vec::with_capacity(bars.len().saturating_sub(h));
        let mut skipped = 0usize;
        let mut conflicts = 0usize;

        for (i, bar) in bars.iter().enumerate() {
            let Some(end) = sim.window_end(i) else {
                skipped += 1;
                continue;
            };

            let (long, short) = match (
                sim.simulate_at(i, Side::Long),
                sim.simulate_at(i, Side::Short),
            ) {
                (Ok(l), Ok(s)) => (l, s),
                (Err(e), _) | (_, Err(e)) => {
                    debug_assert!(e.is_skippable());
                    skipped += 1;
                    continue;
                }
            };

            let lookahead_return = bars[end].close / bar.close - 1.0;
            if !lookahead_return.is_finite() {
                skipped += 1;
                continue;
            }

            let (winner, tie) = resolve_conflict(&long, &short, self.params.conflict_policy());
            if tie {
                conflicts += 1;
            }

            let row = match winner {
                Some(w) => LabeledBar {
                    bar: *bar,
                    label: Label::from_side(w.side),
                    entry_price: w.entry_price,
                    entry_date: w.entry_date,
                    exit_date: Some(w.exit_date),
                    exit_reason: Some(w.exit_reason),
                    hit_offset: Some(w.hit_offset),
                    lookahead_return,
                },
                None => LabeledBar {
                    bar: *bar,
                    label: Label::Neutral,
                    entry_price: long.entry_price,
                    entry_date: long.entry_date,
                    exit_date: None,
                    exit_reason: None,
                    hit_offset: None,
                    lookahead_return,
                },
            };
            rows.push(row);
        }

        let stats = LabelStats::from_rows(&rows, conflicts);
        tracing::info!(
            rows = stats.total,
            up = stats.up,
            down = stats.down,
            neutral = stats.neutral,
            same_bar_conflicts = stats.same_bar_conflicts,
            skipped,
            "labeling complete"
        );

        LabelRun {
            rows,
            skipped,
            stats,
        }
    }
}

/// Pick the winning take-profit candidate. Returns `(winner, same_bar_tie)`.
fn resolve_conflict<'o>(
    long: &'o TradeOutcome,
    short: &'o TradeOutcome,
    policy: ConflictPolicy,
) -> (Option<&'o TradeOutcome>, bool) {
    let long_hit = long.is_take_profit().then_some(long.exit_index);
    let short_hit = short.is_take_profit().then_some(short.exit_index);

    match (long_hit, short_hit) {
        (Some(l), Some(s)) if l < s => (Some(long), false),
        (Some(l), Some(s)) if s < l => (Some(short), false),
        (Some(_), Some(_)) => {
            let winner = match policy {
                // `First` keeps the historical down bias on exact ties.
                ConflictPolicy::First | ConflictPolicy::PreferDown => Some(short),
                ConflictPolicy::Neutral => None,
            };
            (winner, true)
        }
        (Some(_), None) => (Some(long), false),
        (None, Some(_)) => (Some(short), false),
        (None, None) => (None, false),
    }
}

/// Label a series with the given parameters.
pub fn label(series: &PriceSeries, params: &LabelParams) -> LabelRun {
    Labeler::new(*params).label(series)
}

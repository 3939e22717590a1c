//! Threshold calibration on held-out classifier probabilities.
//!
//! Two stages, both exhaustive grid searches over a deterministic P&L
//! objective:
//! 1. Direction: every `(thr_down, thr_up)` pair with `thr_down < thr_up`,
//!    restricted to days the signal model already flags as trades.
//! 2. Signal: with the direction pair fixed, the signal-probability cutoff.
//!
//! Ties go to the first maximum found (lowest grid index). A search with
//! nothing to evaluate is not an error: it returns sentinel thresholds, a
//! `-inf` objective and `CalibrationStatus::Degenerate`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fxlab_core::Label;

use crate::predictions::PredictionRow;

/// Tolerance on the upper grid bound so `0.1 + k*0.05` still reaches 0.9.
const GRID_EPS: f64 = 1e-9;
/// Upper bound on points per grid axis.
pub const MAX_GRID_POINTS: usize = 10_000;

/// Fallback direction thresholds when calibration is impossible.
pub const DEFAULT_DIRECTION_THRESHOLDS: (f64, f64) = (0.4, 0.6);
/// Fallback signal cutoff when calibration is impossible.
pub const DEFAULT_SIGNAL_THRESHOLD: f64 = 0.5;

/// Errors from calibration setup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("invalid calibration parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("input length mismatch: {name} has {got} rows, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        got: usize,
        expected: usize,
    },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> CalibrationError {
    CalibrationError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

// ─── Configuration ───────────────────────────────────────────────────

/// Closed threshold interval `[thr_min, thr_max]` stepped by `thr_step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdGrid {
    pub thr_min: f64,
    pub thr_max: f64,
    pub thr_step: f64,
}

impl ThresholdGrid {
    pub fn new(thr_min: f64, thr_max: f64, thr_step: f64) -> Result<Self, CalibrationError> {
        let grid = Self {
            thr_min,
            thr_max,
            thr_step,
        };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.thr_step > 0.0 && self.thr_step.is_finite()) {
            return Err(invalid("thr_step", format!("must be > 0, got {}", self.thr_step)));
        }
        if !(0.0..=1.0).contains(&self.thr_min) || !(0.0..=1.0).contains(&self.thr_max) {
            return Err(invalid("thr_min", "grid bounds must lie in [0, 1]"));
        }
        if self.thr_min > self.thr_max {
            return Err(invalid(
                "thr_max",
                format!("{} is below thr_min {}", self.thr_max, self.thr_min),
            ));
        }
        let steps = (self.thr_max - self.thr_min) / self.thr_step;
        if steps >= MAX_GRID_POINTS as f64 {
            return Err(invalid(
                "thr_step",
                format!("{} yields more than {MAX_GRID_POINTS} grid points", self.thr_step),
            ));
        }
        Ok(())
    }

    /// Grid points in ascending order.
    pub fn points(&self) -> Vec<f64> {
        (0..MAX_GRID_POINTS)
            .map(|k| self.thr_min + k as f64 * self.thr_step)
            .take_while(|p| *p <= self.thr_max + GRID_EPS)
            .collect()
    }
}

/// Deterministic per-trade P&L used as the calibration objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CostModel {
    pub stake: f64,
    pub tp_pct: f64,
    pub sl_pct: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            stake: 100.0,
            tp_pct: 0.02,
            sl_pct: 0.01,
        }
    }
}

impl CostModel {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let fields = [("stake", self.stake), ("tp_pct", self.tp_pct), ("sl_pct", self.sl_pct)];
        for (name, value) in fields {
            if !(value > 0.0 && value.is_finite()) {
                return Err(invalid(name, format!("must be > 0, got {value}")));
            }
        }
        Ok(())
    }

    /// Correct direction earns the take-profit; a wrong direction or a trade
    /// on a neutral day costs the stop. No trade, no P&L.
    pub fn trade_pnl(&self, predicted: Label, truth: Label) -> f64 {
        match predicted {
            Label::Neutral => 0.0,
            p if p == truth => self.stake * self.tp_pct,
            _ => -self.stake * self.sl_pct,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    pub direction_grid: ThresholdGrid,
    pub signal_grid: ThresholdGrid,
    /// Signal cutoff used to pick trade days while tuning direction.
    pub initial_signal_threshold: f64,
    pub min_pred_down: usize,
    pub min_pred_up: usize,
    /// Minimum directional trades for a signal cutoff to be admissible.
    pub min_trades: usize,
    pub cost: CostModel,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            direction_grid: ThresholdGrid {
                thr_min: 0.05,
                thr_max: 0.95,
                thr_step: 0.05,
            },
            signal_grid: ThresholdGrid {
                thr_min: 0.30,
                thr_max: 0.90,
                thr_step: 0.05,
            },
            initial_signal_threshold: DEFAULT_SIGNAL_THRESHOLD,
            min_pred_down: 5,
            min_pred_up: 5,
            min_trades: 10,
            cost: CostModel::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        self.direction_grid.validate()?;
        self.signal_grid.validate()?;
        self.cost.validate()?;
        if !(0.0..=1.0).contains(&self.initial_signal_threshold) {
            return Err(invalid(
                "initial_signal_threshold",
                format!("must lie in [0, 1], got {}", self.initial_signal_threshold),
            ));
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Why a search could not produce a calibrated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateReason {
    /// No validation day was eligible for trading.
    NoTradingDays,
    /// Trading days existed but no grid cell met the minimum-count guard.
    NoAdmissibleCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Calibrated,
    Degenerate(DegenerateReason),
}

impl CalibrationStatus {
    pub fn is_degenerate(&self) -> bool {
        matches!(self, CalibrationStatus::Degenerate(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionThresholds {
    pub thr_down: f64,
    pub thr_up: f64,
    pub best_pnl: f64,
    pub n_down: usize,
    pub n_up: usize,
    pub status: CalibrationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalThreshold {
    pub thr_signal: f64,
    pub best_pnl: f64,
    pub n_trades: usize,
    pub status: CalibrationStatus,
}

/// Both stages plus the recomputed decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub direction: DirectionThresholds,
    pub signal: SignalThreshold,
    /// Validation-set P&L of the final decisions.
    pub validation_pnl: f64,
    #[serde(skip)]
    pub combined: Vec<Label>,
}

// ─── Decision rule ───────────────────────────────────────────────────

/// `down` at or below `thr_down`, `up` at or above `thr_up`, else neutral.
pub fn classify_direction(dir_prob_up: f64, thr_down: f64, thr_up: f64) -> Label {
    if dir_prob_up <= thr_down {
        Label::Down
    } else if dir_prob_up >= thr_up {
        Label::Up
    } else {
        Label::Neutral
    }
}

/// Final per-day decisions from both model outputs.
pub fn combine_predictions(
    signal_prob: &[f64],
    dir_prob_up: &[f64],
    thr_signal: f64,
    thr_down: f64,
    thr_up: f64,
) -> Vec<Label> {
    signal_prob
        .iter()
        .zip(dir_prob_up)
        .map(|(&s, &d)| {
            if s >= thr_signal {
                classify_direction(d, thr_down, thr_up)
            } else {
                Label::Neutral
            }
        })
        .collect()
}

fn check_len(name: &'static str, got: usize, expected: usize) -> Result<(), CalibrationError> {
    if got != expected {
        return Err(CalibrationError::LengthMismatch {
            name,
            got,
            expected,
        });
    }
    Ok(())
}

// ─── Stage 1: direction ──────────────────────────────────────────────

/// Search `(thr_down, thr_up)` over the direction grid.
///
/// Only days with `signal_pred == true` are scored. Pairs producing fewer than
/// `min_pred_down` downs or `min_pred_up` ups are rejected. The returned pair
/// always satisfies `thr_down < thr_up`.
pub fn tune_direction_thresholds(
    signal_pred: &[bool],
    dir_prob_up: &[f64],
    true_labels: &[Label],
    config: &CalibrationConfig,
) -> Result<DirectionThresholds, CalibrationError> {
    config.validate()?;
    check_len("dir_prob_up", dir_prob_up.len(), signal_pred.len())?;
    check_len("true_labels", true_labels.len(), signal_pred.len())?;

    let days: Vec<(f64, Label)> = signal_pred
        .iter()
        .zip(dir_prob_up.iter().zip(true_labels))
        .filter(|(trade, _)| **trade)
        .map(|(_, (&p, &truth))| (p, truth))
        .collect();

    if days.is_empty() {
        return Ok(degenerate_direction(DegenerateReason::NoTradingDays));
    }

    let points = config.direction_grid.points();
    let mut best: Option<DirectionThresholds> = None;

    for (i, &thr_down) in points.iter().enumerate() {
        for &thr_up in &points[i + 1..] {
            let mut n_down = 0usize;
            let mut n_up = 0usize;
            let mut pnl = 0.0;
            for &(p, truth) in &days {
                let pred = classify_direction(p, thr_down, thr_up);
                match pred {
                    Label::Down => n_down += 1,
                    Label::Up => n_up += 1,
                    Label::Neutral => {}
                }
                pnl += config.cost.trade_pnl(pred, truth);
            }
            if n_down < config.min_pred_down || n_up < config.min_pred_up {
                continue;
            }
            if best.map_or(true, |b| pnl > b.best_pnl) {
                best = Some(DirectionThresholds {
                    thr_down,
                    thr_up,
                    best_pnl: pnl,
                    n_down,
                    n_up,
                    status: CalibrationStatus::Calibrated,
                });
            }
        }
    }

    Ok(best.unwrap_or_else(|| degenerate_direction(DegenerateReason::NoAdmissibleCell)))
}

fn degenerate_direction(reason: DegenerateReason) -> DirectionThresholds {
    let (thr_down, thr_up) = DEFAULT_DIRECTION_THRESHOLDS;
    tracing::warn!(?reason, thr_down, thr_up, "direction calibration degenerate, using defaults");
    DirectionThresholds {
        thr_down,
        thr_up,
        best_pnl: f64::NEG_INFINITY,
        n_down: 0,
        n_up: 0,
        status: CalibrationStatus::Degenerate(reason),
    }
}

// ─── Stage 2: signal ─────────────────────────────────────────────────

/// Search the signal cutoff with direction thresholds fixed.
///
/// A cutoff is admissible when it yields at least `min_trades` directional
/// decisions.
pub fn tune_signal_trade_threshold(
    signal_prob: &[f64],
    dir_prob_up: &[f64],
    true_labels: &[Label],
    thr_down: f64,
    thr_up: f64,
    config: &CalibrationConfig,
) -> Result<SignalThreshold, CalibrationError> {
    config.validate()?;
    check_len("dir_prob_up", dir_prob_up.len(), signal_prob.len())?;
    check_len("true_labels", true_labels.len(), signal_prob.len())?;

    // Days that trade at the loosest cutoff; nothing else can trade either.
    let directional: Vec<(f64, Label, Label)> = signal_prob
        .iter()
        .zip(dir_prob_up.iter().zip(true_labels))
        .map(|(&s, (&d, &truth))| (s, classify_direction(d, thr_down, thr_up), truth))
        .filter(|&(s, pred, _)| pred != Label::Neutral && s >= config.signal_grid.thr_min)
        .collect();

    if directional.is_empty() {
        return Ok(degenerate_signal(DegenerateReason::NoTradingDays));
    }

    let mut best: Option<SignalThreshold> = None;
    for thr_signal in config.signal_grid.points() {
        let mut n_trades = 0usize;
        let mut pnl = 0.0;
        for &(s, pred, truth) in &directional {
            if s >= thr_signal {
                n_trades += 1;
                pnl += config.cost.trade_pnl(pred, truth);
            }
        }
        if n_trades < config.min_trades.max(1) {
            continue;
        }
        if best.map_or(true, |b| pnl > b.best_pnl) {
            best = Some(SignalThreshold {
                thr_signal,
                best_pnl: pnl,
                n_trades,
                status: CalibrationStatus::Calibrated,
            });
        }
    }

    Ok(best.unwrap_or_else(|| degenerate_signal(DegenerateReason::NoAdmissibleCell)))
}

fn degenerate_signal(reason: DegenerateReason) -> SignalThreshold {
    tracing::warn!(
        ?reason,
        thr_signal = DEFAULT_SIGNAL_THRESHOLD,
        "signal calibration degenerate, using default"
    );
    SignalThreshold {
        thr_signal: DEFAULT_SIGNAL_THRESHOLD,
        best_pnl: f64::NEG_INFINITY,
        n_trades: 0,
        status: CalibrationStatus::Degenerate(reason),
    }
}

// ─── Full pipeline ───────────────────────────────────────────────────

/// Run both stages on a validation split and recompute `combined_pred`.
pub fn calibrate(
    rows: &[PredictionRow],
    config: &CalibrationConfig,
) -> Result<Calibration, CalibrationError> {
    let signal_prob: Vec<f64> = rows.iter().map(|r| r.signal_prob).collect();
    let dir_prob: Vec<f64> = rows.iter().map(|r| r.direction_prob_up).collect();
    let truth: Vec<Label> = rows.iter().map(|r| r.label_true).collect();
    let signal_pred: Vec<bool> = signal_prob
        .iter()
        .map(|&s| s >= config.initial_signal_threshold)
        .collect();

    let direction = tune_direction_thresholds(&signal_pred, &dir_prob, &truth, config)?;
    let signal = tune_signal_trade_threshold(
        &signal_prob,
        &dir_prob,
        &truth,
        direction.thr_down,
        direction.thr_up,
        config,
    )?;

    let combined = combine_predictions(
        &signal_prob,
        &dir_prob,
        signal.thr_signal,
        direction.thr_down,
        direction.thr_up,
    );
    let validation_pnl = combined
        .iter()
        .zip(&truth)
        .map(|(&pred, &t)| config.cost.trade_pnl(pred, t))
        .sum();

    tracing::info!(
        thr_down = direction.thr_down,
        thr_up = direction.thr_up,
        thr_signal = signal.thr_signal,
        validation_pnl,
        degenerate = direction.status.is_degenerate() || signal.status.is_degenerate(),
        "calibration complete"
    );

    Ok(Calibration {
        direction,
        signal,
        validation_pnl,
        combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_down: usize, min_up: usize) -> CalibrationConfig {
        CalibrationConfig {
            direction_grid: ThresholdGrid::new(0.1, 0.9, 0.1).unwrap(),
            signal_grid: ThresholdGrid::new(0.5, 0.9, 0.1).unwrap(),
            min_pred_down: min_down,
            min_pred_up: min_up,
            min_trades: 1,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn grid_points_include_upper_bound() {
        let g = ThresholdGrid::new(0.1, 0.9, 0.1).unwrap();
        let pts = g.points();
        assert_eq!(pts.len(), 9);
        assert!((pts[8] - 0.9).abs() < 1e-9);
        assert_eq!(ThresholdGrid::new(0.5, 0.5, 0.1).unwrap().points(), vec![0.5]);
    }

    #[test]
    fn grid_validation() {
        assert!(ThresholdGrid::new(0.1, 0.9, 0.0).is_err());
        assert!(ThresholdGrid::new(0.9, 0.1, 0.1).is_err());
        assert!(ThresholdGrid::new(-0.1, 0.9, 0.1).is_err());
        assert!(ThresholdGrid::new(0.1, 1.1, 0.1).is_err());
    }

    #[test]
    fn grid_rejects_steps_finer_than_point_cap() {
        assert!(matches!(
            ThresholdGrid::new(0.0, 1.0, 1e-300),
            Err(CalibrationError::InvalidParameter { name: "thr_step", .. })
        ));
        assert!(ThresholdGrid::new(0.0, 1.0, 1e-5).is_err());
        let fine = ThresholdGrid::new(0.0, 1.0, 1e-3).unwrap();
        assert_eq!(fine.points().len(), 1_001);

        // Unvalidated grids still terminate.
        let raw = ThresholdGrid {
            thr_min: 0.0,
            thr_max: 1.0,
            thr_step: 1e-300,
        };
        assert_eq!(raw.points().len(), MAX_GRID_POINTS);
    }

    #[test]
    fn trade_pnl_follows_cost_model() {
        let c = CostModel {
            stake: 100.0,
            tp_pct: 0.02,
            sl_pct: 0.01,
        };
        assert_eq!(c.trade_pnl(Label::Up, Label::Up), 2.0);
        assert_eq!(c.trade_pnl(Label::Up, Label::Down), -1.0);
        assert_eq!(c.trade_pnl(Label::Down, Label::Neutral), -1.0);
        assert_eq!(c.trade_pnl(Label::Neutral, Label::Up), 0.0);
    }

    #[test]
    fn separable_directions_are_found() {
        let dir = [0.05, 0.15, 0.12, 0.85, 0.95, 0.88, 0.5, 0.55];
        let truth = [
            Label::Down,
            Label::Down,
            Label::Down,
            Label::Up,
            Label::Up,
            Label::Up,
            Label::Neutral,
            Label::Neutral,
        ];
        let signal = [true; 8];
        let res = tune_direction_thresholds(&signal, &dir, &truth, &config(1, 1)).unwrap();
        assert_eq!(res.status, CalibrationStatus::Calibrated);
        assert!(res.thr_down < res.thr_up);
        assert_eq!(res.n_down, 3);
        assert_eq!(res.n_up, 3);
        assert!((res.best_pnl - 6.0 * 2.0).abs() < 1e-9);
        // First maximum: lowest thr_down that still catches 0.15 is 0.2.
        assert!((res.thr_down - 0.2).abs() < 1e-9);
    }

    #[test]
    fn min_prediction_guard_rejects_one_sided_pairs() {
        // Nothing reaches the lowest possible thr_up of 0.2.
        let dir = [0.05, 0.1, 0.12, 0.15];
        let truth = [Label::Down; 4];
        let signal = [true; 4];
        let res = tune_direction_thresholds(&signal, &dir, &truth, &config(1, 1)).unwrap();
        assert_eq!(
            res.status,
            CalibrationStatus::Degenerate(DegenerateReason::NoAdmissibleCell)
        );
        assert_eq!((res.thr_down, res.thr_up), DEFAULT_DIRECTION_THRESHOLDS);
        assert_eq!(res.best_pnl, f64::NEG_INFINITY);
    }

    #[test]
    fn no_signal_days_is_degenerate() {
        let truth = [Label::Up, Label::Down];
        let res =
            tune_direction_thresholds(&[false, false], &[0.1, 0.9], &truth, &config(0, 0)).unwrap();
        assert_eq!(
            res.status,
            CalibrationStatus::Degenerate(DegenerateReason::NoTradingDays)
        );

        let sig = tune_signal_trade_threshold(&[], &[], &[], 0.4, 0.6, &config(0, 0)).unwrap();
        assert_eq!(sig.thr_signal, DEFAULT_SIGNAL_THRESHOLD);
        assert!(sig.status.is_degenerate());
    }

    #[test]
    fn signal_threshold_filters_noisy_low_confidence_days() {
        // High-confidence days are right, low-confidence days are wrong.
        let signal_prob = [0.95, 0.92, 0.91, 0.55, 0.52, 0.51];
        let dir = [0.9, 0.9, 0.1, 0.9, 0.9, 0.1];
        let truth = [Label::Up, Label::Up, Label::Down, Label::Down, Label::Down, Label::Up];
        let res = tune_signal_trade_threshold(&signal_prob, &dir, &truth, 0.4, 0.6, &config(0, 0))
            .unwrap();
        assert_eq!(res.n_trades, 3);
        assert!(res.thr_signal > 0.55 && res.thr_signal <= 0.9 + 1e-9);
        assert!((res.thr_signal - 0.6).abs() < 1e-9);
        assert!((res.best_pnl - 6.0).abs() < 1e-9);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = tune_direction_thresholds(&[true], &[0.1, 0.2], &[Label::Up], &config(0, 0));
        assert!(matches!(err, Err(CalibrationError::LengthMismatch { .. })));
    }

    #[test]
    fn combine_predictions_applies_both_stages() {
        let out = combine_predictions(&[0.9, 0.9, 0.9, 0.2], &[0.1, 0.5, 0.9, 0.9], 0.5, 0.4, 0.6);
        assert_eq!(out, vec![Label::Down, Label::Neutral, Label::Up, Label::Neutral]);
    }
}

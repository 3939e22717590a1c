//! Property tests for calibration and backtest invariants.
//!
//! Uses proptest to verify:
//! 1. Direction search never returns thr_down >= thr_up
//! 2. Settlement conservation — summed daily P&L equals capital change
//! 3. Fixed-stake P&L does not depend on settlement timing
//! 4. Post-hoc leverage equals a leveraged run

use chrono::NaiveDate;
use fxlab_core::{Label, LabelParams, PriceSeries};
use fxlab_runner::data_loader::synthetic_bars;
use fxlab_runner::{
    run_backtest, tune_direction_thresholds, BacktestPolicy, CalibrationConfig, PredictionRow,
    ReturnConvention, Settlement, StakeStrategy, ThresholdGrid,
};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_label() -> impl Strategy<Value = Label> {
    prop_oneof![Just(Label::Up), Just(Label::Down), Just(Label::Neutral)]
}

fn series() -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
    PriceSeries::from_raw(synthetic_bars(3, start, 120)).unwrap().0
}

fn params() -> LabelParams {
    LabelParams::builder()
        .horizon_days(3)
        .tp_pct(0.004)
        .fixed_stop(0.003)
        .build()
        .unwrap()
}

/// Predictions on random series days (some past the usable window).
fn arb_predictions() -> impl Strategy<Value = Vec<PredictionRow>> {
    prop::collection::vec((0usize..120, arb_label(), arb_label()), 0..60).prop_map(|picks| {
        let s = series();
        let mut rows: Vec<PredictionRow> = picks
            .into_iter()
            .map(|(i, truth, pred)| PredictionRow {
                date: s.bars()[i].date,
                label_true: truth,
                signal_prob: 0.8,
                direction_prob_up: 0.5,
                combined_pred: pred,
            })
            .collect();
        rows.sort_by_key(|r| r.date);
        rows.dedup_by_key(|r| r.date);
        rows
    })
}

fn fixed(settlement: Settlement, convention: ReturnConvention) -> BacktestPolicy {
    BacktestPolicy {
        start_capital: 10_000.0,
        strategy: StakeStrategy::Fixed { stake: 1_000.0 },
        settlement,
        convention,
        ..BacktestPolicy::default()
    }
}

// ── 1. Calibration ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn direction_thresholds_are_ordered(
        days in prop::collection::vec((any::<bool>(), 0.0..=1.0_f64, arb_label()), 0..80),
        min_down in 0usize..4,
        min_up in 0usize..4,
    ) {
        let signal: Vec<bool> = days.iter().map(|d| d.0).collect();
        let probs: Vec<f64> = days.iter().map(|d| d.1).collect();
        let truth: Vec<Label> = days.iter().map(|d| d.2).collect();
        let config = CalibrationConfig {
            direction_grid: ThresholdGrid::new(0.1, 0.9, 0.1).unwrap(),
            min_pred_down: min_down,
            min_pred_up: min_up,
            ..CalibrationConfig::default()
        };
        let res = tune_direction_thresholds(&signal, &probs, &truth, &config).unwrap();
        prop_assert!(res.thr_down < res.thr_up);
        if !res.status.is_degenerate() {
            prop_assert!(res.n_down >= min_down && res.n_up >= min_up);
            prop_assert!(res.best_pnl.is_finite());
        } else {
            prop_assert_eq!(res.best_pnl, f64::NEG_INFINITY);
        }
    }
}

// ── 2–4. Backtest ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn immediate_settlement_conserves_capital(preds in arb_predictions()) {
        let policy = fixed(Settlement::Immediate, ReturnConvention::SlTp);
        let r = run_backtest(&preds, &series(), params(), policy).unwrap();
        let summed: f64 = r.points.iter().map(|p| p.pnl).sum();
        let net = r.summary.final_capital - r.summary.start_capital;
        prop_assert!((summed - net).abs() < 1e-6);
        prop_assert_eq!(r.points.len(), preds.len());
    }

    #[test]
    fn settlement_timing_does_not_change_fixed_stake_pnl(preds in arb_predictions()) {
        for convention in [ReturnConvention::SlTp, ReturnConvention::TpOnly] {
            let immediate = fixed(Settlement::Immediate, convention);
            let at_exit = fixed(Settlement::AtExit, convention);
            let now = run_backtest(&preds, &series(), params(), immediate).unwrap();
            let later = run_backtest(&preds, &series(), params(), at_exit).unwrap();
            prop_assert_eq!(now.trades.len(), later.trades.len());
            prop_assert!((now.summary.final_capital - later.summary.final_capital).abs() < 1e-6);
            let summed: f64 = later.points.iter().map(|p| p.pnl).sum();
            let net = later.summary.final_capital - later.summary.start_capital;
            prop_assert!((summed - net).abs() < 1e-6);
            // Every deferred trade is eventually settled.
            let settled: usize = later.points.iter().map(|p| p.settled).sum();
            prop_assert_eq!(settled, later.trades.len());
        }
    }

    #[test]
    fn post_hoc_leverage_matches_direct_run(preds in arb_predictions(), lev in 0.5..5.0_f64) {
        let mut policy = fixed(Settlement::AtExit, ReturnConvention::SlTp);
        let base = run_backtest(&preds, &series(), params(), policy).unwrap();
        policy.leverage = lev;
        let direct = run_backtest(&preds, &series(), params(), policy).unwrap();
        let scaled = base.with_leverage(lev).unwrap();
        prop_assert!((scaled.summary.final_capital - direct.summary.final_capital).abs() < 1e-6);
        prop_assert_eq!(scaled.summary.wins, direct.summary.wins);
    }
}

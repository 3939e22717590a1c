//! Performance metrics — pure functions over capital curves and trade lists.

use crate::backtest::TradeRecord;

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(capital_curve: &[f64]) -> f64 {
    match (capital_curve.first(), capital_curve.last()) {
        (Some(&initial), Some(&final_cap)) if initial > 0.0 => (final_cap - initial) / initial,
        _ => 0.0,
    }
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 for fewer than two points or a curve that never declines.
pub fn max_drawdown(capital_curve: &[f64]) -> f64 {
    if capital_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = capital_curve[0];
    let mut max_dd = 0.0_f64;

    for &cap in capital_curve {
        if cap > peak {
            peak = cap;
        }
        if peak > 0.0 {
            let dd = (cap - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Win rate: fraction of trades with positive P&L.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Profit factor: gross profits / gross losses.
///
/// Returns `f64::INFINITY` when there are profits and no losses, 0.0 when
/// there are no trades or no profits.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .sum();

    if gross_loss < 1e-15 {
        if gross_profit > 0.0 {
            return f64::INFINITY;
        }
        return 0.0;
    }
    gross_profit / gross_loss
}

/// Longest run of consecutive losing trades.
pub fn max_consecutive_losses(trades: &[TradeRecord]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for t in trades {
        if t.pnl < 0.0 {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fxlab_core::{ExitReason, Label, Side};

    fn trade(pnl: f64) -> TradeRecord {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        TradeRecord {
            signal_date: d,
            side: Side::Long,
            label_true: Label::Up,
            entry_date: d,
            entry_price: 1.1,
            exit_date: d,
            exit_reason: ExitReason::Tp,
            stake: 100.0,
            realized_return: pnl / 100.0,
            pnl,
            booked_on: d,
            auto_stopped: false,
        }
    }

    #[test]
    fn total_return_known() {
        assert!((total_return(&[1_000.0, 1_100.0]) - 0.1).abs() < 1e-12);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn max_drawdown_known() {
        let curve = vec![10_000.0, 11_000.0, 9_000.0, 9_500.0];
        let expected = (9_000.0 - 11_000.0) / 11_000.0;
        assert!((max_drawdown(&curve) - expected).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_monotonic_increase() {
        let curve: Vec<f64> = (0..50).map(|i| 10_000.0 + i as f64 * 10.0).collect();
        assert_eq!(max_drawdown(&curve), 0.0);
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![trade(2.0), trade(-1.0), trade(-1.0), trade(2.0), trade(-1.0)];
        assert!((win_rate(&trades) - 0.4).abs() < 1e-12);
        assert!((profit_factor(&trades) - 4.0 / 3.0).abs() < 1e-12);
        assert_eq!(max_consecutive_losses(&trades), 2);
    }

    #[test]
    fn profit_factor_edge_cases() {
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[trade(1.0)]), f64::INFINITY);
        assert_eq!(profit_factor(&[trade(-1.0)]), 0.0);
    }
}

//! Volatility helpers for the trade simulator.

pub mod atr;

pub use atr::{atr_sma, true_range};

/// Trailing mean over `window` values; NaN until `window` values are seen
/// and wherever the window holds a NaN.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 {
        return out;
    }
    for (end, slot) in out.iter_mut().enumerate().skip(window - 1) {
        let w = &values[end + 1 - window..=end];
        if w.iter().all(|v| v.is_finite()) {
            *slot = w.iter().sum::<f64>() / window as f64;
        }
    }
    out
}

/// Weekday-agnostic test bars from `(open, high, low, close)` quotes.
#[cfg(test)]
pub(crate) fn quotes(rows: &[(f64, f64, f64, f64)]) -> Vec<crate::domain::Bar> {
    let start = chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    rows.iter()
        .zip(start.iter_days())
        .map(|(&(o, h, l, c), date)| crate::domain::Bar::new(date, o, h, l, c))
        .collect()
}

#[cfg(test)]
pub(crate) fn close_to(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() < 1e-12
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_starts_at_window_minus_one() {
        let m = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(m[..2].iter().all(|v| v.is_nan()));
        assert!(close_to(m[2], 2.0));
        assert!(close_to(m[4], 4.0));
    }

    #[test]
    fn nan_poisons_its_windows_only() {
        let m = rolling_mean(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert!(m[1].is_nan() && m[2].is_nan());
        assert!(close_to(m[3], 3.5));
    }

    #[test]
    fn degenerate_windows() {
        assert_eq!(rolling_mean(&[2.0, 4.0], 1), vec![2.0, 4.0]);
        assert!(rolling_mean(&[2.0, 4.0], 0).iter().all(|v| v.is_nan()));
        assert!(rolling_mean(&[2.0, 4.0], 3).iter().all(|v| v.is_nan()));
    }
}

//! Average True Range in its simple-moving-average form.
//!
//! `TR[0] = high - low`; afterwards TR also covers gaps against the previous
//! close. `ATR[t]` is the unweighted mean of the last `window` TR values and
//! stays NaN until `window` of them exist.

use crate::domain::Bar;
use crate::indicators::rolling_mean;

pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let first = bars.first().map(|b| b.high - b.low);
    first
        .into_iter()
        .chain(bars.windows(2).map(|pair| {
            let (prev, bar) = (&pair[0], &pair[1]);
            (bar.high - bar.low)
                .max((bar.high - prev.close).abs())
                .max((bar.low - prev.close).abs())
        }))
        .collect()
}

/// ATR with `min_periods == window`.
pub fn atr_sma(bars: &[Bar], window: usize) -> Vec<f64> {
    rolling_mean(&true_range(bars), window)
}

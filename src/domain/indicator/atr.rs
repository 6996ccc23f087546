//! Average True Range.
//!
//! TR[0] = high - low (no previous close), TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! ATR is the simple moving average of TR over `period` bars.
//! Warmup: first (period-1) points have no value.

use crate::domain::indicator::{rolling_mean, simple_series, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 14;

pub fn true_ranges(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.range()
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    let tr = true_ranges(bars);
    simple_series(
        IndicatorType::Atr(period),
        bars.iter().map(|b| b.date),
        rolling_mean(&tr, period),
    )
}

//! RSI (Relative Strength Index) indicator.
//!
//! Average gain and average loss are simple rolling means of the last n
//! close-to-close deltas (no Wilder smoothing).
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! avg_loss == 0 with avg_gain > 0: RSI = 100 (saturated, overbought).
//! avg_loss == 0 and avg_gain == 0: no value.
//!
//! Warmup: first n bars have no value (n deltas are needed).

use crate::domain::indicator::{rolling_mean, simple_series, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(bars: &[Bar], period: usize) -> IndicatorSeries {
    let dates = bars.iter().map(|b| b.date);
    if period == 0 || bars.len() < 2 {
        return simple_series(IndicatorType::Rsi(period), dates, vec![None; bars.len()]);
    }

    let mut gains = Vec::with_capacity(bars.len() - 1);
    let mut losses = Vec::with_capacity(bars.len() - 1);
    for pair in bars.windows(2) {
        let change = pair[1].close - pair[0].close;
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    let mut values = Vec::with_capacity(bars.len());
    values.push(None);
    for (gain, loss) in avg_gain.into_iter().zip(avg_loss) {
        values.push(match (gain, loss) {
            (Some(g), Some(l)) => rsi_from_averages(g, l),
            _ => None,
        });
    }

    simple_series(IndicatorType::Rsi(period), dates, values)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain > 0.0 { Some(100.0) } else { None }
    } else {
        Some(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
    }
}

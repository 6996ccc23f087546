//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the first close, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! No bias correction, so every point has a value.

use crate::domain::indicator::{simple_series, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub fn calculate_ema(bars: &[Bar], span: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let values = if span == 0 {
        vec![None; bars.len()]
    } else {
        ema_values(&closes, span).into_iter().map(Some).collect()
    };
    simple_series(IndicatorType::Ema(span), bars.iter().map(|b| b.date), values)
}

/// EMA over a raw series. `span` must be non-zero.
pub fn ema_values(values: &[f64], span: usize) -> Vec<f64> {
    let k = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = 0.0;
    for (i, v) in values.iter().enumerate() {
        ema = if i == 0 { *v } else { v * k + ema * (1.0 - k) };
        out.push(ema);
    }
    out
}

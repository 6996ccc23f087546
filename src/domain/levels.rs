//! Entry / target / stop-loss calculation.
//!
//! volatility_unit = ATR(14) at the latest bar
//! entry           = max(20-day high, close + 0.3 * volatility_unit)
//! stop_loss       = entry - multiplier * volatility_unit
//! target          = entry + ratio * (entry - stop_loss)
//!
//! Every value is rounded to 2 decimals as it is computed.

use crate::domain::indicator::{atr, calculate_atr};
use crate::domain::ohlcv::{recent_high, Bar};
use crate::domain::scorer::{round2, BREAKOUT_WINDOW};

pub const ENTRY_BUFFER: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevels {
    pub entry: f64,
    pub target: f64,
    pub stop_loss: f64,
    pub volatility_unit: f64,
}

impl PriceLevels {
    pub fn risk(&self) -> f64 {
        self.entry - self.stop_loss
    }

    pub fn reward(&self) -> f64 {
        self.target - self.entry
    }
}

/// Levels for the latest bar, or `None` when ATR is undefined or zero, a
/// parameter is not positive, or rounding would collapse
/// `stop_loss < entry < target`.
pub fn calculate_levels(bars: &[Bar], volatility_multiplier: f64, reward_risk_ratio: f64) -> Option<PriceLevels> {
    if !(volatility_multiplier > 0.0 && reward_risk_ratio > 0.0) {
        return None;
    }
    let latest = bars.last()?;
    let atr = calculate_atr(bars, atr::DEFAULT_PERIOD).latest_simple()?;
    if !(atr > 0.0) {
        return None;
    }
    let high20 = recent_high(bars, BREAKOUT_WINDOW)?;

    let entry = round2(high20.max(latest.close + atr * ENTRY_BUFFER));
    let stop_loss = round2(entry - volatility_multiplier * atr);
    let risk = entry - stop_loss;
    let target = round2(entry + reward_risk_ratio * risk);

    if stop_loss < entry && entry < target {
        Some(PriceLevels {
            entry,
            target,
            stop_loss,
            volatility_unit: round2(atr),
        })
    } else {
        None
    }
}

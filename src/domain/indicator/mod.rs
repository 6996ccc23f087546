//! Technical indicator implementations.
//!
//! Every indicator returns one point per input bar. A point's value is `None`
//! until the indicator has enough history; callers treat `None` as "not
//! scoreable", never as zero.
//!
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: A time series of indicator values

pub mod atr;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod volume;

pub use atr::calculate_atr;
pub use ema::{calculate_ema, ema_values};
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use volume::calculate_volume_sma;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub value: Option<IndicatorValue>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd { line: f64, signal: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Atr(usize),
    Rsi(usize),
    Ema(usize),
    VolumeSma(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn latest(&self) -> Option<IndicatorValue> {
        self.values.last().and_then(|p| p.value)
    }

    /// Latest value of a single-valued indicator.
    pub fn latest_simple(&self) -> Option<f64> {
        match self.latest() {
            Some(IndicatorValue::Simple(v)) => Some(v),
            _ => None,
        }
    }

    /// Simple value at `index`, `None` for warmup points or other shapes.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.values.get(index).and_then(|p| p.value) {
            Some(IndicatorValue::Simple(v)) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Ema(span) => write!(f, "EMA({})", span),
            IndicatorType::VolumeSma(period) => write!(f, "VOLUME_SMA({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
        }
    }
}

/// Simple rolling mean. Points before the window is full are `None`.
pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    // Full window sum per point, no running sum.
    (0..values.len())
        .map(|i| {
            if i + 1 >= period {
                let window = &values[i + 1 - period..=i];
                Some(window.iter().sum::<f64>() / period as f64)
            } else {
                None
            }
        })
        .collect()
}

pub(crate) fn simple_series(
    indicator_type: IndicatorType,
    dates: impl Iterator<Item = NaiveDate>,
    values: Vec<Option<f64>>,
) -> IndicatorSeries {
    IndicatorSeries {
        indicator_type,
        values: dates
            .zip(values)
            .map(|(date, v)| IndicatorPoint {
                date,
                value: v.map(IndicatorValue::Simple),
            })
            .collect(),
    }
}

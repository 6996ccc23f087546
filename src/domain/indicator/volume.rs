//! Simple moving average of volume.

use crate::domain::indicator::{rolling_mean, simple_series, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 20;

pub fn calculate_volume_sma(bars: &[Bar], period: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    simple_series(
        IndicatorType::VolumeSma(period),
        bars.iter().map(|b| b.date),
        rolling_mean(&volumes, period),
    )
}

//! Market data port trait.

use crate::domain::error::BreakoutError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

pub trait BarSource {
    /// The most recent `lookback_days` daily bars dated on or before `as_of`,
    /// oldest first. An empty series is not an error.
    fn fetch_daily_bars(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        lookback_days: usize,
    ) -> Result<Vec<Bar>, BreakoutError>;

    /// Intraday bars for one session, oldest first. Sources without intraday
    /// data return an empty series.
    fn fetch_intraday_bars(&self, _instrument: &str, _date: NaiveDate) -> Result<Vec<Bar>, BreakoutError> {
        Ok(Vec::new())
    }
}

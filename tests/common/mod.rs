#![allow(dead_code)]

use breakout::domain::error::BreakoutError;
pub use breakout::domain::ohlcv::Bar;
use breakout::ports::bar_port::BarSource;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

pub struct MockBarSource {
    pub data: HashMap<String, Vec<Bar>>,
    pub intraday: HashMap<(String, NaiveDate), Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            intraday: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<Bar>) -> Self {
        self.data.entry(instrument.to_string()).or_default().extend(bars);
        self
    }

    pub fn with_intraday(mut self, instrument: &str, date: NaiveDate, bars: Vec<Bar>) -> Self {
        self.intraday.insert((instrument.to_string(), date), bars);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl BarSource for MockBarSource {
    fn fetch_daily_bars(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        lookback_days: usize,
    ) -> Result<Vec<Bar>, BreakoutError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(BreakoutError::BarSource {
                instrument: instrument.to_string(),
                reason: reason.clone(),
            });
        }
        let mut bars: Vec<Bar> = self
            .data
            .get(instrument)
            .map(|bars| bars.iter().filter(|b| b.date <= as_of).cloned().collect())
            .unwrap_or_default();
        bars.sort_by_key(|b| b.date);
        let start = bars.len().saturating_sub(lookback_days);
        Ok(bars.split_off(start))
    }

    fn fetch_intraday_bars(&self, instrument: &str, date: NaiveDate) -> Result<Vec<Bar>, BreakoutError> {
        Ok(self
            .intraday
            .get(&(instrument.to_string(), date))
            .cloned()
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn bar(instrument: &str, date: NaiveDate, close: f64, volume: i64) -> Bar {
    Bar {
        instrument: instrument.to_string(),
        date,
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume,
    }
}

/// Realized session with explicit high/low.
pub fn session(instrument: &str, date: NaiveDate, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        instrument: instrument.to_string(),
        date,
        open: low.max(close.min(high)),
        high,
        low,
        close,
        volume: 1500,
    }
}

/// Series ending on `end`, one bar per calendar day. `delta(k)` is the close
/// change into the bar `k` steps before the last one.
fn series(
    instrument: &str,
    end: NaiveDate,
    count: usize,
    start_price: f64,
    delta: impl Fn(usize) -> f64,
    last_volume: i64,
) -> Vec<Bar> {
    let mut close = start_price;
    (0..count)
        .map(|i| {
            let from_end = count - 1 - i;
            if i > 0 {
                close += delta(from_end);
            }
            let volume = if from_end == 0 { last_volume } else { 1000 };
            bar(instrument, end - Duration::days(from_end as i64), close, volume)
        })
        .collect()
}

/// Saw-tooth uptrend (+1.5 / -1.2, last move up) with a 5x volume spike on
/// the last bar. Every scoring signal fires: RSI ~55.6, MACD above signal and
/// zero, close above EMA(20), close one point under the 20-day high with ATR
/// 2.35.
pub fn bullish_bars(instrument: &str, end: NaiveDate, count: usize) -> Vec<Bar> {
    series(
        instrument,
        end,
        count,
        100.0,
        |k| if k % 2 == 0 { 1.5 } else { -1.2 },
        5000,
    )
}

/// Saw-tooth downtrend (-1.0 / +0.5, last move down), flat volume. Scores 0.
pub fn bearish_bars(instrument: &str, end: NaiveDate, count: usize) -> Vec<Bar> {
    series(
        instrument,
        end,
        count,
        150.0,
        |k| if k % 2 == 0 { -1.0 } else { 0.5 },
        1000,
    )
}

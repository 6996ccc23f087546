//! Candidate scoring and selection.
//!
//! Each signal adds a fixed weight; nothing subtracts. All signals read the
//! same latest bar.
//!
//! | Condition                                   | Points |
//! |---------------------------------------------|--------|
//! | RSI in [40, 60]                             | 2.0    |
//! | RSI in (60, 70]                             | 1.0    |
//! | MACD line > signal line                     | 2.0    |
//! | MACD line > 0                               | 1.0    |
//! | volume / 20-day average volume > 1.5        | 2.0    |
//! | volume ratio in (1.2, 1.5]                  | 1.0    |
//! | close > EMA(20)                             | 1.5    |
//! | 20-day high - close <= ATR                  | 2.0    |

use crate::domain::indicator::{
    atr, calculate_atr, calculate_ema, calculate_macd, calculate_rsi, calculate_volume_sma,
    macd, rsi, volume, IndicatorValue,
};
use crate::domain::ohlcv::{recent_high, Bar};

pub const MIN_BARS: usize = 30;
pub const MAX_SCORE: f64 = 10.5;
pub const TREND_EMA_SPAN: usize = 20;
pub const BREAKOUT_WINDOW: usize = 20;

/// Latest indicator readings for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub close: f64,
    pub volume: f64,
    pub atr: f64,
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub volume_avg: Option<f64>,
    pub ema20: f64,
    pub high20: f64,
}

impl Snapshot {
    /// `None` when the series is not scoreable: fewer than [`MIN_BARS`] bars,
    /// undefined RSI or ATR, or ATR of exactly zero.
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        if bars.len() < MIN_BARS {
            return None;
        }
        let latest = bars.last()?;

        let atr = calculate_atr(bars, atr::DEFAULT_PERIOD).latest_simple()?;
        if atr == 0.0 {
            return None;
        }
        let rsi = calculate_rsi(bars, rsi::DEFAULT_PERIOD).latest_simple()?;
        let (macd_line, macd_signal) = match calculate_macd(
            bars,
            macd::DEFAULT_FAST,
            macd::DEFAULT_SLOW,
            macd::DEFAULT_SIGNAL,
        )
        .latest()?
        {
            IndicatorValue::Macd { line, signal } => (line, signal),
            IndicatorValue::Simple(_) => return None,
        };
        let ema20 = calculate_ema(bars, TREND_EMA_SPAN).latest_simple()?;
        let volume_avg = calculate_volume_sma(bars, volume::DEFAULT_PERIOD).latest_simple();
        let high20 = recent_high(bars, BREAKOUT_WINDOW)?;

        Some(Self {
            close: latest.close,
            volume: latest.volume as f64,
            atr,
            rsi,
            macd_line,
            macd_signal,
            volume_avg,
            ema20,
            high20,
        })
    }

    /// Latest volume over its 20-day average, when the average is positive.
    pub fn volume_ratio(&self) -> Option<f64> {
        self.volume_avg
            .filter(|avg| *avg > 0.0)
            .map(|avg| self.volume / avg)
    }

    pub fn points(&self) -> f64 {
        let mut score = 0.0;

        if (40.0..=60.0).contains(&self.rsi) {
            score += 2.0;
        } else if self.rsi > 60.0 && self.rsi <= 70.0 {
            score += 1.0;
        }

        if self.macd_line > self.macd_signal {
            score += 2.0;
        }
        if self.macd_line > 0.0 {
            score += 1.0;
        }

        if let Some(ratio) = self.volume_ratio() {
            if ratio > 1.5 {
                score += 2.0;
            } else if ratio > 1.2 {
                score += 1.0;
            }
        }

        if self.close > self.ema20 {
            score += 1.5;
        }

        if self.high20 - self.close <= self.atr {
            score += 2.0;
        }

        score
    }
}

/// Snapshot plus its rounded total, kept together for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCard {
    pub snapshot: Snapshot,
    pub score: f64,
}

impl ScoreCard {
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let snapshot = Snapshot::from_bars(bars)?;
        Some(Self {
            score: round2(snapshot.points()),
            snapshot,
        })
    }
}

/// Composite score rounded to 2 decimals, or `None` if not scoreable.
pub fn score(bars: &[Bar]) -> Option<f64> {
    ScoreCard::from_bars(bars).map(|card| card.score)
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub instrument: String,
    pub score: f64,
    pub bars: Vec<Bar>,
}

/// Keep candidates scoring strictly above `threshold`, highest first, ties in
/// enumeration order, at most `count` of them.
pub fn select_top(mut candidates: Vec<ScoredCandidate>, threshold: f64, count: usize) -> Vec<ScoredCandidate> {
    candidates.retain(|c| c.score > threshold);
    // sort_by is stable
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(count);
    candidates
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

//! Prediction records and per-run evaluation metrics.

use crate::domain::levels::PriceLevels;
use crate::domain::ohlcv::Bar;
use crate::domain::outcome::Outcome;
use chrono::NaiveDate;

/// Realized prices for the session a prediction targeted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RealizedBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl From<&Bar> for RealizedBar {
    fn from(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

impl RealizedBar {
    /// Collapse an ordered intraday series into one session.
    pub fn from_intraday(bars: &[Bar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;
        Some(Self {
            open: first.open,
            high: bars.iter().map(|b| b.high).fold(f64::MIN, f64::max),
            low: bars.iter().map(|b| b.low).fold(f64::MAX, f64::min),
            close: last.close,
            volume: bars.iter().map(|b| b.volume).sum(),
        })
    }
}

/// Outcome fields are only ever present together.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedOutcome {
    pub realized: RealizedBar,
    pub label: Outcome,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Store-assigned id; `None` until persisted.
    pub id: Option<i64>,
    pub instrument: String,
    pub issued_date: NaiveDate,
    pub target_date: NaiveDate,
    pub levels: PriceLevels,
    /// Multiplier in effect when `levels` were computed.
    pub volatility_multiplier: f64,
    pub score: f64,
    pub outcome: Option<RecordedOutcome>,
}

impl Prediction {
    pub fn is_labeled(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub target_hit: usize,
    pub stop_loss_hit: usize,
    pub no_entry: usize,
    pub stagnant: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::TargetHit => self.target_hit += 1,
            Outcome::StopLossHit => self.stop_loss_hit += 1,
            Outcome::NoEntry => self.no_entry += 1,
            Outcome::Stagnant => self.stagnant += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.target_hit + self.stop_loss_hit + self.no_entry + self.stagnant
    }

    /// TARGET_HIT share rounded to 4 decimals; `None` when nothing was labeled.
    pub fn win_rate(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let rate = self.target_hit as f64 / total as f64;
        Some((rate * 10_000.0).round() / 10_000.0)
    }
}

/// One row of the append-only evaluation history.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationMetric {
    pub date: NaiveDate,
    pub total: usize,
    pub counts: OutcomeCounts,
    pub win_rate: f64,
    pub retrained: bool,
}

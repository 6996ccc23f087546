//! Parameter re-optimization over a fixed grid.
//!
//! For every labeled prediction the volatility unit is back-derived from the
//! stored levels: `(entry - stop_loss) / multiplier_used`. Each grid cell
//! rebuilds stop and target around the original entry and replays the
//! outcome classifier against the realized high/low. The cell with the most
//! TARGET_HIT outcomes wins; ties go to the first cell in grid order
//! (multiplier-major).

use crate::domain::outcome::{classify, Outcome};
use crate::domain::prediction::Prediction;

pub const MULTIPLIER_GRID: [f64; 6] = [1.2, 1.35, 1.5, 1.65, 1.8, 2.0];
pub const RATIO_GRID: [f64; 5] = [1.5, 1.75, 2.0, 2.25, 2.5];
pub const DEFAULT_MIN_SAMPLES: usize = 10;
pub const DEFAULT_WINDOW: usize = 60;
pub const DEFAULT_ACCURACY_THRESHOLD: f64 = 0.40;
pub const DEFAULT_TRAILING_CYCLES: usize = 5;

/// One historical (prediction, realized session) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrainSample {
    pub entry: f64,
    pub stop_loss: f64,
    pub multiplier_used: f64,
    pub realized_high: f64,
    pub realized_low: f64,
}

impl RetrainSample {
    /// `None` for predictions without a recorded outcome.
    pub fn from_prediction(prediction: &Prediction) -> Option<Self> {
        let outcome = prediction.outcome.as_ref()?;
        Some(Self {
            entry: prediction.levels.entry,
            stop_loss: prediction.levels.stop_loss,
            multiplier_used: prediction.volatility_multiplier,
            realized_high: outcome.realized.high,
            realized_low: outcome.realized.low,
        })
    }

    /// Volatility unit implied by the stored levels, if derivable.
    pub fn implied_volatility_unit(&self) -> Option<f64> {
        if self.multiplier_used <= 0.0 {
            return None;
        }
        let unit = (self.entry - self.stop_loss) / self.multiplier_used;
        (unit > 0.0).then_some(unit)
    }
}

/// Replay one sample under candidate parameters. Samples that never reached
/// entry, or whose volatility unit cannot be derived, are `NoEntry`.
pub fn simulate_outcome(sample: &RetrainSample, multiplier: f64, ratio: f64) -> Outcome {
    if sample.realized_high < sample.entry {
        return Outcome::NoEntry;
    }
    let Some(unit) = sample.implied_volatility_unit() else {
        return Outcome::NoEntry;
    };
    let stop_loss = sample.entry - multiplier * unit;
    let target = sample.entry + ratio * (sample.entry - stop_loss);
    classify(
        sample.entry,
        target,
        stop_loss,
        sample.realized_high,
        sample.realized_low,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub multiplier: f64,
    pub ratio: f64,
    pub wins: usize,
    pub total: usize,
}

impl GridCell {
    pub fn win_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.wins as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrainResult {
    pub best: GridCell,
    /// Every evaluated cell in grid order.
    pub cells: Vec<GridCell>,
    pub samples: usize,
}

/// Exhaustive search over [`MULTIPLIER_GRID`] x [`RATIO_GRID`].
/// `None` when fewer than `min_samples` samples are available.
pub fn optimize(samples: &[RetrainSample], min_samples: usize) -> Option<RetrainResult> {
    if samples.is_empty() || samples.len() < min_samples {
        return None;
    }

    let mut cells = Vec::with_capacity(MULTIPLIER_GRID.len() * RATIO_GRID.len());
    let mut best: Option<GridCell> = None;

    for &multiplier in &MULTIPLIER_GRID {
        for &ratio in &RATIO_GRID {
            let wins = samples
                .iter()
                .filter(|s| simulate_outcome(s, multiplier, ratio).is_win())
                .count();
            let cell = GridCell {
                multiplier,
                ratio,
                wins,
                total: samples.len(),
            };
            if best.is_none_or(|b| cell.win_rate() > b.win_rate()) {
                best = Some(cell);
            }
            cells.push(cell);
        }
    }

    best.map(|best| RetrainResult {
        best,
        cells,
        samples: samples.len(),
    })
}

/// Retraining is due when either the current or the trailing win rate is
/// below `threshold`.
pub fn should_retrain(current_win_rate: f64, trailing_win_rate: Option<f64>, threshold: f64) -> bool {
    current_win_rate < threshold || trailing_win_rate.is_some_and(|wr| wr < threshold)
}

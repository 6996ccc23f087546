//! Tunable model parameters.
//!
//! A single process-wide record, persisted by the record store. The scoring
//! cycle reads it at start; only retraining writes it.

pub const DEFAULT_VOLATILITY_MULTIPLIER: f64 = 1.5;
pub const DEFAULT_REWARD_RISK_RATIO: f64 = 2.0;
pub const DEFAULT_SCORE_THRESHOLD: f64 = 4.0;
pub const DEFAULT_SELECTION_COUNT: usize = 5;

pub const VOLATILITY_MULTIPLIER: &str = "volatility_multiplier";
pub const REWARD_RISK_RATIO: &str = "reward_risk_ratio";
pub const SCORE_THRESHOLD: &str = "score_threshold";
pub const SELECTION_COUNT: &str = "selection_count";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub volatility_multiplier: f64,
    pub reward_risk_ratio: f64,
    pub score_threshold: f64,
    pub selection_count: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            volatility_multiplier: DEFAULT_VOLATILITY_MULTIPLIER,
            reward_risk_ratio: DEFAULT_REWARD_RISK_RATIO,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            selection_count: DEFAULT_SELECTION_COUNT,
        }
    }
}

impl ModelParams {
    /// Name/value pairs in storage order.
    pub fn to_entries(&self) -> [(&'static str, f64); 4] {
        [
            (VOLATILITY_MULTIPLIER, self.volatility_multiplier),
            (REWARD_RISK_RATIO, self.reward_risk_ratio),
            (SCORE_THRESHOLD, self.score_threshold),
            (SELECTION_COUNT, self.selection_count as f64),
        ]
    }

    /// Overlay stored name/value pairs onto `self`. Unknown names are ignored.
    pub fn with_entries<'a>(mut self, entries: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        for (name, value) in entries {
            match name {
                VOLATILITY_MULTIPLIER => self.volatility_multiplier = value,
                REWARD_RISK_RATIO => self.reward_risk_ratio = value,
                SCORE_THRESHOLD => self.score_threshold = value,
                SELECTION_COUNT if value >= 0.0 => self.selection_count = value.round() as usize,
                _ => {}
            }
        }
        self
    }

    /// Copy with the two retrainable values replaced.
    pub fn with_tuned(self, volatility_multiplier: f64, reward_risk_ratio: f64) -> Self {
        Self {
            volatility_multiplier,
            reward_risk_ratio,
            ..self
        }
    }
}

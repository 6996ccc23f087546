//! Persistence port trait for predictions, parameters and metrics.

use crate::domain::error::BreakoutError;
use crate::domain::outcome::Outcome;
use crate::domain::params::ModelParams;
use crate::domain::prediction::{EvaluationMetric, Prediction, RealizedBar};
use chrono::NaiveDate;

pub trait RecordStore {
    fn get_params(&self) -> Result<ModelParams, BreakoutError>;

    /// Write volatility multiplier and reward/risk ratio in one transaction.
    fn set_params(&self, params: &ModelParams) -> Result<(), BreakoutError>;

    /// Insert or update by (instrument, target_date) in one transaction.
    /// Outcome columns are never touched and labeled rows are left as they are.
    fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<(), BreakoutError>;

    fn get_predictions(&self, target_date: NaiveDate) -> Result<Vec<Prediction>, BreakoutError>;

    /// Record an outcome once. A second write fails with
    /// `OutcomeAlreadyRecorded`.
    fn update_outcome(
        &self,
        prediction_id: i64,
        realized: &RealizedBar,
        label: Outcome,
        rationale: &str,
    ) -> Result<(), BreakoutError>;

    /// Mean win rate of the last `cycles` metrics, `None` when there are none.
    fn get_recent_win_rate(&self, cycles: usize) -> Result<Option<f64>, BreakoutError>;

    /// Most recent labeled predictions first.
    fn get_labeled_predictions(&self, limit: usize) -> Result<Vec<Prediction>, BreakoutError>;

    fn append_metric(&self, metric: &EvaluationMetric) -> Result<(), BreakoutError>;

    /// Whether a metric was already appended for `date`.
    fn has_metric(&self, date: NaiveDate) -> Result<bool, BreakoutError>;

    /// Most recent metrics first.
    fn get_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>, BreakoutError>;
}

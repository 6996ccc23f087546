//! Report output port trait.

use crate::domain::cycle::AnalysisReport;
use crate::domain::error::BreakoutError;
use crate::domain::params::ModelParams;
use crate::domain::prediction::{EvaluationMetric, Prediction};

/// Port for presenting cycle results to an operator.
pub trait ReportPort {
    fn predictions(&self, predictions: &[Prediction]) -> Result<(), BreakoutError>;

    fn analysis(&self, report: &AnalysisReport) -> Result<(), BreakoutError>;

    fn params(&self, params: &ModelParams) -> Result<(), BreakoutError>;

    /// Default implementation writes nothing.
    fn history(&self, _metrics: &[EvaluationMetric]) -> Result<(), BreakoutError> {
        Ok(())
    }
}

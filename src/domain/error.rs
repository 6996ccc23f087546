//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for breakout.
#[derive(Debug, thiserror::Error)]
pub enum BreakoutError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("bar source error for {instrument}: {reason}")]
    BarSource { instrument: String, reason: String },

    #[error("bar source unavailable: all {failed} instrument fetches failed")]
    BarSourceUnavailable { failed: usize },

    #[error("no data for {instrument}")]
    NoData { instrument: String },

    #[error("insufficient data for {instrument}: have {bars} bars, need {minimum}")]
    InsufficientData {
        instrument: String,
        bars: usize,
        minimum: usize,
    },

    #[error("prediction {id} already has a recorded outcome")]
    OutcomeAlreadyRecorded { id: i64 },

    #[error("prediction {id} not found")]
    PredictionNotFound { id: i64 },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&BreakoutError> for std::process::ExitCode {
    fn from(err: &BreakoutError) -> Self {
        let code: u8 = match err {
            BreakoutError::Io(_) => 1,
            BreakoutError::ConfigParse { .. }
            | BreakoutError::ConfigMissing { .. }
            | BreakoutError::ConfigInvalid { .. }
            | BreakoutError::Universe(_) => 2,
            BreakoutError::Database { .. }
            | BreakoutError::DatabaseQuery { .. }
            | BreakoutError::OutcomeAlreadyRecorded { .. }
            | BreakoutError::PredictionNotFound { .. } => 3,
            BreakoutError::BarSource { .. }
            | BreakoutError::BarSourceUnavailable { .. }
            | BreakoutError::NoData { .. }
            | BreakoutError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

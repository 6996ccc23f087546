//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod scorer;
pub mod levels;
pub mod outcome;
pub mod rationale;
pub mod retrain;
pub mod params;
pub mod prediction;
pub mod cycle;
pub mod universe;
pub mod trading_days;
pub mod config_validation;
pub mod error;

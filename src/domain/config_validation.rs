//! Configuration validation.
//!
//! Validates all config fields before any cycle runs.

use crate::domain::error::BreakoutError;
use crate::domain::params::{
    DEFAULT_REWARD_RISK_RATIO, DEFAULT_SCORE_THRESHOLD, DEFAULT_SELECTION_COUNT, DEFAULT_VOLATILITY_MULTIPLIER,
};
use crate::domain::retrain::{
    DEFAULT_ACCURACY_THRESHOLD, DEFAULT_MIN_SAMPLES, DEFAULT_TRAILING_CYCLES, DEFAULT_WINDOW,
};
use crate::domain::scorer::{MAX_SCORE, MIN_BARS};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    validate_backend_config(config)?;
    validate_universe_config(config)?;
    validate_model_config(config)?;
    validate_retrain_config(config)?;
    Ok(())
}

/// Store backend and bar source selection.
pub fn validate_backend_config(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    match config.get_choice("store", "backend", "sqlite").as_str() {
        "sqlite" => require(config, "sqlite", "path")?,
        "postgres" => require(config, "postgres", "connection_string")?,
        other => {
            return Err(invalid(
                "store",
                "backend",
                format!("unknown backend '{}', expected sqlite or postgres", other),
            ));
        }
    }

    if config.get_int("sqlite", "pool_size", 4) < 1 {
        return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
    }

    match config.get_choice("bars", "source", "store").as_str() {
        "store" => Ok(()),
        "csv" => require(config, "bars", "csv_dir"),
        other => Err(invalid(
            "bars",
            "source",
            format!("unknown bar source '{}', expected store or csv", other),
        )),
    }
}

pub fn validate_universe_config(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    let codes = config
        .get_string("universe", "codes")
        .ok_or_else(|| BreakoutError::ConfigMissing {
            section: "universe".to_string(),
            key: "codes".to_string(),
        })?;
    parse_codes(&codes).map_err(|e| invalid("universe", "codes", e.to_string()))?;
    Ok(())
}

pub fn validate_model_config(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    let multiplier = config.get_double("model", "volatility_multiplier", DEFAULT_VOLATILITY_MULTIPLIER);
    if multiplier <= 0.0 {
        return Err(invalid(
            "model",
            "volatility_multiplier",
            "volatility_multiplier must be positive",
        ));
    }

    let ratio = config.get_double("model", "reward_risk_ratio", DEFAULT_REWARD_RISK_RATIO);
    if ratio <= 0.0 {
        return Err(invalid("model", "reward_risk_ratio", "reward_risk_ratio must be positive"));
    }

    let threshold = config.get_double("model", "score_threshold", DEFAULT_SCORE_THRESHOLD);
    if !(0.0..MAX_SCORE).contains(&threshold) {
        return Err(invalid(
            "model",
            "score_threshold",
            format!("score_threshold must be in [0, {})", MAX_SCORE),
        ));
    }

    let count = config.get_int("model", "selection_count", DEFAULT_SELECTION_COUNT as i64);
    if count < 1 {
        return Err(invalid("model", "selection_count", "selection_count must be at least 1"));
    }

    let lookback = config.get_int("scoring", "lookback_days", 60);
    if lookback < MIN_BARS as i64 {
        return Err(invalid(
            "scoring",
            "lookback_days",
            format!("lookback_days must be at least {}", MIN_BARS),
        ));
    }
    Ok(())
}

pub fn validate_retrain_config(config: &dyn ConfigPort) -> Result<(), BreakoutError> {
    let threshold = config.get_double("retrain", "accuracy_threshold", DEFAULT_ACCURACY_THRESHOLD);
    if threshold <= 0.0 || threshold > 1.0 {
        return Err(invalid(
            "retrain",
            "accuracy_threshold",
            "accuracy_threshold must be in (0, 1]",
        ));
    }

    let trailing = config.get_int("retrain", "trailing_cycles", DEFAULT_TRAILING_CYCLES as i64);
    if trailing < 1 {
        return Err(invalid("retrain", "trailing_cycles", "trailing_cycles must be at least 1"));
    }

    let min_samples = config.get_int("retrain", "min_samples", DEFAULT_MIN_SAMPLES as i64);
    if min_samples < 1 {
        return Err(invalid("retrain", "min_samples", "min_samples must be at least 1"));
    }

    let window = config.get_int("retrain", "window", DEFAULT_WINDOW as i64);
    if window < min_samples {
        return Err(invalid("retrain", "window", "window must be at least min_samples"));
    }
    Ok(())
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), BreakoutError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(BreakoutError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> BreakoutError {
    BreakoutError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

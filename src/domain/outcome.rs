//! Outcome classification for a completed trading session.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    NoEntry,
    StopLossHit,
    TargetHit,
    Stagnant,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::NoEntry,
        Outcome::StopLossHit,
        Outcome::TargetHit,
        Outcome::Stagnant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::NoEntry => "NO_ENTRY",
            Outcome::StopLossHit => "STOP_LOSS_HIT",
            Outcome::TargetHit => "TARGET_HIT",
            Outcome::Stagnant => "STAGNANT",
        }
    }

    pub fn is_win(&self) -> bool {
        matches!(self, Outcome::TargetHit)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outcome label: {0}")]
pub struct UnknownOutcome(pub String);

impl FromStr for Outcome {
    type Err = UnknownOutcome;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| UnknownOutcome(s.to_string()))
    }
}

/// Label a session against predicted levels. First match wins:
///
/// 1. high < entry → `NoEntry` (the setup never triggered)
/// 2. low <= stop_loss → `StopLossHit`, even if the target was also touched
/// 3. high >= target → `TargetHit`
/// 4. otherwise `Stagnant`
pub fn classify(entry: f64, target: f64, stop_loss: f64, realized_high: f64, realized_low: f64) -> Outcome {
    if realized_high < entry {
        Outcome::NoEntry
    } else if realized_low <= stop_loss {
        Outcome::StopLossHit
    } else if realized_high >= target {
        Outcome::TargetHit
    } else {
        Outcome::Stagnant
    }
}

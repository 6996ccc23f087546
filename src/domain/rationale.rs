//! Human-readable explanation for a labeled prediction.
//!
//! Built from three observations around the target session: volume against
//! its 20-day average, the EMA(9)/EMA(21) trend, and (when intraday bars are
//! available) the shape of the session.

use crate::domain::indicator::ema_values;
use crate::domain::levels::PriceLevels;
use crate::domain::ohlcv::Bar;
use crate::domain::outcome::Outcome;
use crate::domain::prediction::RealizedBar;
use std::fmt;

const VOLUME_WINDOW: usize = 20;
const FAST_TREND_SPAN: usize = 9;
const SLOW_TREND_SPAN: usize = 21;
const FIRST_HOUR_BARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeContext {
    VeryHigh,
    AboveAverage,
    Average,
    BelowAverage,
    VeryLow,
}

impl VolumeContext {
    /// Compare `volume` with the mean of the last 20 daily volumes.
    pub fn assess(volume: i64, daily: &[Bar]) -> Self {
        if daily.len() < VOLUME_WINDOW {
            return VolumeContext::Average;
        }
        let window = &daily[daily.len() - VOLUME_WINDOW..];
        let avg = window.iter().map(|b| b.volume as f64).sum::<f64>() / VOLUME_WINDOW as f64;
        if avg == 0.0 {
            return VolumeContext::Average;
        }
        let ratio = volume as f64 / avg;
        if ratio >= 2.0 {
            VolumeContext::VeryHigh
        } else if ratio >= 1.3 {
            VolumeContext::AboveAverage
        } else if ratio <= 0.5 {
            VolumeContext::VeryLow
        } else if ratio <= 0.8 {
            VolumeContext::BelowAverage
        } else {
            VolumeContext::Average
        }
    }

    fn is_high(&self) -> bool {
        matches!(self, VolumeContext::VeryHigh)
    }

    fn is_low(&self) -> bool {
        matches!(self, VolumeContext::VeryLow)
    }
}

impl fmt::Display for VolumeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeContext::VeryHigh => "very high volume (2x+ average)",
            VolumeContext::AboveAverage => "above-average volume",
            VolumeContext::Average => "average volume",
            VolumeContext::BelowAverage => "below-average volume",
            VolumeContext::VeryLow => "very low volume (below 50% of average)",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendContext {
    StrongUptrend,
    MildUptrend,
    Flat,
    MildDowntrend,
    StrongDowntrend,
    Indeterminate,
}

impl TrendContext {
    /// Gap between EMA(9) and EMA(21) at the last two closes.
    pub fn assess(daily: &[Bar]) -> Self {
        if daily.len() < SLOW_TREND_SPAN {
            return TrendContext::Indeterminate;
        }
        let closes: Vec<f64> = daily.iter().map(|b| b.close).collect();
        let fast = ema_values(&closes, FAST_TREND_SPAN);
        let slow = ema_values(&closes, SLOW_TREND_SPAN);
        let n = closes.len();
        let latest = fast[n - 1] - slow[n - 1];
        let prev = fast[n - 2] - slow[n - 2];

        if latest > 0.0 && prev > 0.0 && latest > prev {
            TrendContext::StrongUptrend
        } else if latest > 0.0 {
            TrendContext::MildUptrend
        } else if latest < 0.0 && prev < 0.0 && latest < prev {
            TrendContext::StrongDowntrend
        } else if latest < 0.0 {
            TrendContext::MildDowntrend
        } else {
            TrendContext::Flat
        }
    }

    fn is_downtrend(&self) -> bool {
        matches!(self, TrendContext::StrongDowntrend | TrendContext::MildDowntrend)
    }
}

impl fmt::Display for TrendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendContext::StrongUptrend => "strong uptrend (EMA9 widening above EMA21)",
            TrendContext::MildUptrend => "mild uptrend (EMA9 above EMA21)",
            TrendContext::Flat => "flat/ranging market",
            TrendContext::MildDowntrend => "mild downtrend (EMA9 below EMA21)",
            TrendContext::StrongDowntrend => "strong downtrend (EMA9 widening below EMA21)",
            TrendContext::Indeterminate => "indeterminate trend",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntradayPattern {
    OpeningSpikeSelloff,
    LateBreakout,
    None,
}

impl IntradayPattern {
    /// Needs at least four intraday bars (the first hour).
    pub fn assess(intraday: &[Bar]) -> Self {
        if intraday.len() < FIRST_HOUR_BARS {
            return IntradayPattern::None;
        }
        let open = intraday[0].open;
        let close = intraday[intraday.len() - 1].close;
        let first_hour_high = intraday[..FIRST_HOUR_BARS]
            .iter()
            .map(|b| b.high)
            .fold(f64::MIN, f64::max);
        let day_high = intraday.iter().map(|b| b.high).fold(f64::MIN, f64::max);

        if first_hour_high == day_high && close < open {
            IntradayPattern::OpeningSpikeSelloff
        } else if close > first_hour_high {
            IntradayPattern::LateBreakout
        } else {
            IntradayPattern::None
        }
    }

    fn note(&self) -> &'static str {
        match self {
            IntradayPattern::OpeningSpikeSelloff => " Opening spike followed by sustained selling.",
            IntradayPattern::LateBreakout => " Late-session breakout confirmed strength.",
            IntradayPattern::None => "",
        }
    }
}

/// Context gathered for one prediction before the text is rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Context {
    pub volume: VolumeContext,
    pub trend: TrendContext,
    pub intraday: IntradayPattern,
}

impl Context {
    pub fn assess(realized: &RealizedBar, daily: &[Bar], intraday: &[Bar]) -> Self {
        Self {
            volume: VolumeContext::assess(realized.volume, daily),
            trend: TrendContext::assess(daily),
            intraday: IntradayPattern::assess(intraday),
        }
    }
}

pub fn explain(outcome: Outcome, levels: &PriceLevels, realized: &RealizedBar, ctx: &Context) -> String {
    let vol = ctx.volume;
    let trend = ctx.trend;
    let mut text = match outcome {
        Outcome::NoEntry => {
            let gap = levels.entry - realized.high;
            let mut s = format!(
                "Buying pressure was insufficient. The stock never crossed the trigger price \
                 ({:.2}), missing by {:.2}. Trend: {trend}; Volume: {vol}.",
                levels.entry, gap
            );
            if vol.is_low() {
                s.push_str(" Lack of participation kept the price range-bound.");
            }
            if trend == TrendContext::Flat {
                s.push_str(" Market ranged with no directional conviction.");
            }
            s
        }
        Outcome::TargetHit => {
            let mut s = format!(
                "Strong momentum carried the stock past the target ({:.2}). \
                 Volume: {vol}; Trend: {trend}.",
                levels.target
            );
            if vol.is_high() {
                s.push_str(" Volume confirmed the breakout direction.");
            }
            s
        }
        Outcome::StopLossHit => {
            let breach = levels.stop_loss - realized.low;
            let mut s = format!(
                "Trend reversal detected. The stock broke key support at {:.2} \
                 (breached by {:.2}). Trend: {trend}; Volume: {vol}.",
                levels.stop_loss, breach
            );
            if vol.is_low() {
                s.push_str(" Likely a fakeout on low volume, a thin order book amplified the move.");
            }
            if trend.is_downtrend() {
                s.push_str(" Broader selling pressure overrode the breakout thesis.");
            }
            s.push_str(" Parameters are re-evaluated against this false signal.");
            s
        }
        Outcome::Stagnant => {
            let pct_move = (realized.close - levels.entry) / levels.entry * 100.0;
            let mut s = format!(
                "Low volatility. Entry was triggered at {:.2} but the stock closed at {:.2} \
                 ({:+.2}%), failing to reach either target ({:.2}) or stop-loss ({:.2}). \
                 Volume: {vol}; Trend: {trend}.",
                levels.entry, realized.close, pct_move, levels.target, levels.stop_loss
            );
            if !vol.is_high() {
                s.push_str(" Insufficient participation to sustain momentum.");
            }
            s.push_str(" Market lacked the power to push the stock to the target before closing.");
            s
        }
    };
    text.push_str(ctx.intraday.note());
    text
}

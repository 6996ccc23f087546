//! Daily OHLCV bar representation.

use chrono::NaiveDate;

/// One trading session for one instrument. Series of bars are kept in
/// chronological order, most recent last.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub instrument: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// A bar is usable when its prices are finite and positive, high >= low
    /// and volume is non-negative.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.high >= self.low
            && self.volume >= 0
    }
}

/// Highest high over the last `n` bars (fewer if the series is shorter).
pub fn recent_high(bars: &[Bar], n: usize) -> Option<f64> {
    let start = bars.len().saturating_sub(n);
    bars[start..].iter().map(|b| b.high).reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            instrument: "RELIANCE.NS".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000,
        }
    }

    #[test]
    fn true_range_hl_dominates() {
        let bar = sample_bar();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((bar.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bar = sample_bar();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((bar.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let bar = sample_bar();
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((bar.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn well_formed_rejects_inverted_range() {
        let mut bar = sample_bar();
        assert!(bar.is_well_formed());
        bar.low = 120.0;
        assert!(!bar.is_well_formed());
    }

    #[test]
    fn well_formed_rejects_nan() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(!bar.is_well_formed());
    }

    #[test]
    fn recent_high_uses_tail() {
        let mut bars = Vec::new();
        for (i, high) in [150.0, 101.0, 104.0, 102.0].iter().enumerate() {
            let mut bar = sample_bar();
            bar.date = NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap();
            bar.high = *high;
            bars.push(bar);
        }
        assert_eq!(recent_high(&bars, 3), Some(104.0));
        assert_eq!(recent_high(&bars, 10), Some(150.0));
        assert_eq!(recent_high(&[], 3), None);
    }
}

//! CSV file bar source.
//!
//! Daily bars live in `<base>/<INSTRUMENT>.csv` with the header
//! `date,open,high,low,close,volume`. Optional intraday sessions live in
//! `<base>/intraday/<INSTRUMENT>/<YYYY-MM-DD>.csv` with `time` in place of
//! `date`.

use crate::domain::error::BreakoutError;
use crate::domain::ohlcv::Bar;
use crate::ports::bar_port::BarSource;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", instrument))
    }

    fn intraday_path(&self, instrument: &str, date: NaiveDate) -> PathBuf {
        self.base_path
            .join("intraday")
            .join(instrument)
            .join(format!("{}.csv", date.format("%Y-%m-%d")))
    }
}

/// Read a daily bar file, sorted oldest first.
pub fn read_bars(path: &Path, instrument: &str) -> Result<Vec<Bar>, BreakoutError> {
    let content = fs::read_to_string(path).map_err(|e| BreakoutError::BarSource {
        instrument: instrument.to_string(),
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    let mut bars = parse_rows(&content, instrument, |field| {
        NaiveDate::parse_from_str(field, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", field, e))
    })?;
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

/// Parse rows whose first column is resolved to a date by `date_of`. The
/// remaining columns are open, high, low, close, volume.
fn parse_rows(
    content: &str,
    instrument: &str,
    date_of: impl Fn(&str) -> Result<NaiveDate, String>,
) -> Result<Vec<Bar>, BreakoutError> {
    let err = |reason: String| BreakoutError::BarSource {
        instrument: instrument.to_string(),
        reason,
    };

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| err(format!("CSV parse error: {}", e)))?;
        let field = |idx: usize, name: &str| {
            record
                .get(idx)
                .map(str::trim)
                .ok_or_else(|| err(format!("missing {} column", name)))
        };
        let price = |idx: usize, name: &str| -> Result<f64, BreakoutError> {
            field(idx, name)?
                .parse()
                .map_err(|e| err(format!("invalid {} value: {}", name, e)))
        };

        let date = date_of(field(0, "date")?).map_err(err)?;
        let volume: i64 = field(5, "volume")?
            .parse()
            .map_err(|e| err(format!("invalid volume value: {}", e)))?;

        bars.push(Bar {
            instrument: instrument.to_string(),
            date,
            open: price(1, "open")?,
            high: price(2, "high")?,
            low: price(3, "low")?,
            close: price(4, "close")?,
            volume,
        });
    }

    Ok(bars)
}

impl BarSource for CsvAdapter {
    fn fetch_daily_bars(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        lookback_days: usize,
    ) -> Result<Vec<Bar>, BreakoutError> {
        let mut bars = read_bars(&self.csv_path(instrument), instrument)?;
        bars.retain(|b| b.date <= as_of);
        let start = bars.len().saturating_sub(lookback_days);
        Ok(bars.split_off(start))
    }

    fn fetch_intraday_bars(&self, instrument: &str, date: NaiveDate) -> Result<Vec<Bar>, BreakoutError> {
        let path = self.intraday_path(instrument, date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|e| BreakoutError::BarSource {
            instrument: instrument.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        // file order is session order; the time column is not interpreted
        parse_rows(&content, instrument, |_| Ok(date))
    }
}

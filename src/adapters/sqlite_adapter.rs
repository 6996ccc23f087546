//! SQLite store and bar source.

use crate::domain::error::BreakoutError;
use crate::domain::levels::PriceLevels;
use crate::domain::ohlcv::Bar;
use crate::domain::outcome::Outcome;
use crate::domain::params::ModelParams;
use crate::domain::prediction::{EvaluationMetric, OutcomeCounts, Prediction, RealizedBar, RecordedOutcome};
use crate::ports::bar_port::BarSource;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::RecordStore;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};

const DATE_FORMAT: &str = "%Y-%m-%d";

const PREDICTION_COLUMNS: &str = "id, instrument, issued_date, target_date, entry, target, stop_loss,
     volatility_unit, volatility_multiplier, score, realized_open, realized_high, realized_low,
     realized_close, realized_volume, outcome, rationale";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BreakoutError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| BreakoutError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, BreakoutError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, BreakoutError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), BreakoutError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ohlcv (
                instrument TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume INTEGER NOT NULL,
                PRIMARY KEY (instrument, date)
            );
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument TEXT NOT NULL,
                issued_date TEXT NOT NULL,
                target_date TEXT NOT NULL,
                entry REAL NOT NULL,
                target REAL NOT NULL,
                stop_loss REAL NOT NULL,
                volatility_unit REAL NOT NULL,
                volatility_multiplier REAL NOT NULL,
                score REAL NOT NULL,
                realized_open REAL,
                realized_high REAL,
                realized_low REAL,
                realized_close REAL,
                realized_volume INTEGER,
                outcome TEXT,
                rationale TEXT,
                UNIQUE (instrument, target_date)
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_target_date ON predictions(target_date);
            CREATE TABLE IF NOT EXISTS model_params (
                name TEXT PRIMARY KEY,
                value REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS model_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                total INTEGER NOT NULL,
                target_hit INTEGER NOT NULL,
                stop_loss_hit INTEGER NOT NULL,
                no_entry INTEGER NOT NULL,
                stagnant INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                retrained INTEGER NOT NULL
            );",
        )
        .map_err(query_error)?;

        Ok(())
    }

    /// Store `params` for every name that has no value yet.
    pub fn seed_params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for (name, value) in params.to_entries() {
            tx.execute(
                "INSERT OR IGNORE INTO model_params (name, value) VALUES (?1, ?2)",
                params![name, value],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    /// Insert or replace daily bars. Returns the number of rows written.
    pub fn insert_bars(&self, bars: &[Bar]) -> Result<usize, BreakoutError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (instrument, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.instrument,
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(bars.len())
    }

    fn query_predictions(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Prediction>, BreakoutError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(query_error)?;
        let rows = stmt
            .query_map(args, prediction_from_row)
            .map_err(query_error)?;

        let mut predictions = Vec::new();
        for row in rows {
            predictions.push(row.map_err(query_error)?);
        }
        Ok(predictions)
    }
}

impl BarSource for SqliteAdapter {
    fn fetch_daily_bars(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        lookback_days: usize,
    ) -> Result<Vec<Bar>, BreakoutError> {
        let conn = self.conn()?;

        let query = "SELECT instrument, date, open, high, low, close, volume FROM (
                         SELECT * FROM ohlcv
                         WHERE instrument = ?1 AND date <= ?2
                         ORDER BY date DESC
                         LIMIT ?3
                     ) ORDER BY date ASC";

        let mut stmt = conn.prepare(query).map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![instrument, as_of.format(DATE_FORMAT).to_string(), lookback_days as i64],
                |row| {
                    Ok(Bar {
                        instrument: row.get(0)?,
                        date: date_column(row, 1)?,
                        open: row.get(2)?,
                        high: row.get(3)?,
                        low: row.get(4)?,
                        close: row.get(5)?,
                        volume: row.get(6)?,
                    })
                },
            )
            .map_err(|e| BreakoutError::BarSource {
                instrument: instrument.to_string(),
                reason: e.to_string(),
            })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_error)?);
        }
        Ok(bars)
    }
}

impl RecordStore for SqliteAdapter {
    fn get_params(&self) -> Result<ModelParams, BreakoutError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name, value FROM model_params")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))
            .map_err(query_error)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(query_error)?);
        }

        Ok(ModelParams::default().with_entries(entries.iter().map(|(n, v)| (n.as_str(), *v))))
    }

    fn set_params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for (name, value) in params.to_entries() {
            tx.execute(
                "INSERT INTO model_params (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                params![name, value],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<(), BreakoutError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for p in predictions {
            tx.execute(
                "INSERT INTO predictions (instrument, issued_date, target_date, entry, target,
                     stop_loss, volatility_unit, volatility_multiplier, score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(instrument, target_date) DO UPDATE SET
                     issued_date = excluded.issued_date,
                     entry = excluded.entry,
                     target = excluded.target,
                     stop_loss = excluded.stop_loss,
                     volatility_unit = excluded.volatility_unit,
                     volatility_multiplier = excluded.volatility_multiplier,
                     score = excluded.score
                 WHERE predictions.outcome IS NULL",
                params![
                    p.instrument,
                    p.issued_date.format(DATE_FORMAT).to_string(),
                    p.target_date.format(DATE_FORMAT).to_string(),
                    p.levels.entry,
                    p.levels.target,
                    p.levels.stop_loss,
                    p.levels.volatility_unit,
                    p.volatility_multiplier,
                    p.score
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(())
    }

    fn get_predictions(&self, target_date: NaiveDate) -> Result<Vec<Prediction>, BreakoutError> {
        let sql = format!(
            "SELECT {} FROM predictions WHERE target_date = ?1 ORDER BY score DESC, id ASC",
            PREDICTION_COLUMNS
        );
        self.query_predictions(&sql, params![target_date.format(DATE_FORMAT).to_string()])
    }

    fn update_outcome(
        &self,
        prediction_id: i64,
        realized: &RealizedBar,
        label: Outcome,
        rationale: &str,
    ) -> Result<(), BreakoutError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE predictions SET
                     realized_open = ?2, realized_high = ?3, realized_low = ?4,
                     realized_close = ?5, realized_volume = ?6, outcome = ?7, rationale = ?8
                 WHERE id = ?1 AND outcome IS NULL",
                params![
                    prediction_id,
                    realized.open,
                    realized.high,
                    realized.low,
                    realized.close,
                    realized.volume,
                    label.as_str(),
                    rationale
                ],
            )
            .map_err(query_error)?;

        if changed == 1 {
            return Ok(());
        }

        let exists = conn
            .query_row(
                "SELECT 1 FROM predictions WHERE id = ?1",
                params![prediction_id],
                |_| Ok(()),
            )
            .optional()
            .map_err(query_error)?;

        match exists {
            Some(()) => Err(BreakoutError::OutcomeAlreadyRecorded { id: prediction_id }),
            None => Err(BreakoutError::PredictionNotFound { id: prediction_id }),
        }
    }

    fn get_recent_win_rate(&self, cycles: usize) -> Result<Option<f64>, BreakoutError> {
        if cycles == 0 {
            return Ok(None);
        }
        let conn = self.conn()?;
        conn.query_row(
            "SELECT AVG(win_rate) FROM (
                 SELECT win_rate FROM model_metrics ORDER BY date DESC, id DESC LIMIT ?1
             )",
            params![cycles as i64],
            |row| row.get::<_, Option<f64>>(0),
        )
        .map_err(query_error)
    }

    fn get_labeled_predictions(&self, limit: usize) -> Result<Vec<Prediction>, BreakoutError> {
        let sql = format!(
            "SELECT {} FROM predictions WHERE outcome IS NOT NULL
             ORDER BY target_date DESC, id DESC LIMIT ?1",
            PREDICTION_COLUMNS
        );
        self.query_predictions(&sql, params![limit as i64])
    }

    fn append_metric(&self, metric: &EvaluationMetric) -> Result<(), BreakoutError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO model_metrics (date, total, target_hit, stop_loss_hit, no_entry,
                 stagnant, win_rate, retrained)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                metric.date.format(DATE_FORMAT).to_string(),
                metric.total as i64,
                metric.counts.target_hit as i64,
                metric.counts.stop_loss_hit as i64,
                metric.counts.no_entry as i64,
                metric.counts.stagnant as i64,
                metric.win_rate,
                metric.retrained
            ],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn has_metric(&self, date: NaiveDate) -> Result<bool, BreakoutError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM model_metrics WHERE date = ?1)",
            params![date.format(DATE_FORMAT).to_string()],
            |row| row.get::<_, bool>(0),
        )
        .map_err(query_error)
    }

    fn get_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>, BreakoutError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, total, target_hit, stop_loss_hit, no_entry, stagnant, win_rate, retrained
                 FROM model_metrics ORDER BY date DESC, id DESC LIMIT ?1",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(EvaluationMetric {
                    date: date_column(row, 0)?,
                    total: row.get::<_, i64>(1)? as usize,
                    counts: OutcomeCounts {
                        target_hit: row.get::<_, i64>(2)? as usize,
                        stop_loss_hit: row.get::<_, i64>(3)? as usize,
                        no_entry: row.get::<_, i64>(4)? as usize,
                        stagnant: row.get::<_, i64>(5)? as usize,
                    },
                    win_rate: row.get(6)?,
                    retrained: row.get(7)?,
                })
            })
            .map_err(query_error)?;

        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row.map_err(query_error)?);
        }
        Ok(metrics)
    }
}

fn pool_error(e: r2d2::Error) -> BreakoutError {
    BreakoutError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> BreakoutError {
    BreakoutError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn prediction_from_row(row: &Row<'_>) -> rusqlite::Result<Prediction> {
    let label: Option<String> = row.get(15)?;
    let outcome = match label {
        Some(label) => {
            let label = label.parse::<Outcome>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(15, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Some(RecordedOutcome {
                realized: RealizedBar {
                    open: row.get(10)?,
                    high: row.get(11)?,
                    low: row.get(12)?,
                    close: row.get(13)?,
                    volume: row.get(14)?,
                },
                label,
                rationale: row.get::<_, Option<String>>(16)?.unwrap_or_default(),
            })
        }
        None => None,
    };

    Ok(Prediction {
        id: Some(row.get(0)?),
        instrument: row.get(1)?,
        issued_date: date_column(row, 2)?,
        target_date: date_column(row, 3)?,
        levels: PriceLevels {
            entry: row.get(4)?,
            target: row.get(5)?,
            stop_loss: row.get(6)?,
            volatility_unit: row.get(7)?,
        },
        volatility_multiplier: row.get(8)?,
        score: row.get(9)?,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn store() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn prediction(instrument: &str, target: NaiveDate, entry: f64) -> Prediction {
        Prediction {
            id: None,
            instrument: instrument.into(),
            issued_date: target.pred_opt().unwrap(),
            target_date: target,
            levels: PriceLevels {
                entry,
                target: entry + 20.0,
                stop_loss: entry - 10.0,
                volatility_unit: 6.67,
            },
            volatility_multiplier: 1.5,
            score: 7.5,
            outcome: None,
        }
    }

    fn realized() -> RealizedBar {
        RealizedBar {
            open: 99.0,
            high: 125.0,
            low: 95.0,
            close: 121.0,
            volume: 5000,
        }
    }

    fn metric(day: u32, win_rate: f64) -> EvaluationMetric {
        EvaluationMetric {
            date: date(day),
            total: 4,
            counts: OutcomeCounts {
                target_hit: 1,
                stop_loss_hit: 1,
                no_entry: 1,
                stagnant: 1,
            },
            win_rate,
            retrained: false,
        }
    }

    #[test]
    fn from_config_missing_path() {
        let config = EmptyConfig;
        let result = SqliteAdapter::from_config(&config);
        match result {
            Err(BreakoutError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn in_memory_initialization_is_repeatable() {
        let adapter = store();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn fetch_daily_bars_returns_latest_window_in_order() {
        let adapter = store();
        let bars: Vec<Bar> = (1..=10)
            .map(|d| Bar {
                instrument: "TCS.NS".into(),
                date: date(d),
                open: 100.0 + d as f64,
                high: 102.0 + d as f64,
                low: 99.0 + d as f64,
                close: 101.0 + d as f64,
                volume: 1000 * d as i64,
            })
            .collect();
        assert_eq!(adapter.insert_bars(&bars).unwrap(), 10);

        let fetched = adapter.fetch_daily_bars("TCS.NS", date(8), 3).unwrap();
        let dates: Vec<_> = fetched.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(6), date(7), date(8)]);
        assert_eq!(fetched[2], bars[7]);

        assert!(adapter.fetch_daily_bars("INFY.NS", date(8), 3).unwrap().is_empty());
    }

    #[test]
    fn params_default_until_stored() {
        let adapter = store();
        assert_eq!(adapter.get_params().unwrap(), ModelParams::default());

        let seeded = ModelParams {
            score_threshold: 5.0,
            selection_count: 3,
            ..ModelParams::default()
        };
        adapter.seed_params(&seeded).unwrap();
        // seeding never overwrites
        adapter.seed_params(&ModelParams::default()).unwrap();
        assert_eq!(adapter.get_params().unwrap(), seeded);
    }

    #[test]
    fn set_params_round_trips() {
        let adapter = store();
        adapter.seed_params(&ModelParams::default()).unwrap();
        let tuned = ModelParams::default().with_tuned(1.8, 2.25);
        adapter.set_params(&tuned).unwrap();
        assert_eq!(adapter.get_params().unwrap(), tuned);
    }

    #[test]
    fn upsert_is_unique_by_instrument_and_target_date() {
        let adapter = store();
        adapter
            .upsert_predictions(&[prediction("TCS.NS", date(5), 100.0)])
            .unwrap();
        adapter
            .upsert_predictions(&[prediction("TCS.NS", date(5), 105.0)])
            .unwrap();

        let stored = adapter.get_predictions(date(5)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].levels.entry, 105.0);
        assert!(stored[0].id.is_some());
        assert!(!stored[0].is_labeled());
    }

    #[test]
    fn outcome_is_written_once() {
        let adapter = store();
        adapter
            .upsert_predictions(&[prediction("TCS.NS", date(5), 100.0)])
            .unwrap();
        let id = adapter.get_predictions(date(5)).unwrap()[0].id.unwrap();

        adapter
            .update_outcome(id, &realized(), Outcome::TargetHit, "carried through")
            .unwrap();
        let err = adapter
            .update_outcome(id, &realized(), Outcome::Stagnant, "again")
            .unwrap_err();
        assert!(matches!(err, BreakoutError::OutcomeAlreadyRecorded { id: e } if e == id));

        let stored = &adapter.get_predictions(date(5)).unwrap()[0];
        let outcome = stored.outcome.as_ref().unwrap();
        assert_eq!(outcome.label, Outcome::TargetHit);
        assert_eq!(outcome.realized, realized());
        assert_eq!(outcome.rationale, "carried through");
    }

    #[test]
    fn update_outcome_unknown_id() {
        let adapter = store();
        let err = adapter
            .update_outcome(42, &realized(), Outcome::NoEntry, "")
            .unwrap_err();
        assert!(matches!(err, BreakoutError::PredictionNotFound { id: 42 }));
    }

    #[test]
    fn upsert_leaves_labeled_rows_alone() {
        let adapter = store();
        adapter
            .upsert_predictions(&[prediction("TCS.NS", date(5), 100.0)])
            .unwrap();
        let id = adapter.get_predictions(date(5)).unwrap()[0].id.unwrap();
        adapter
            .update_outcome(id, &realized(), Outcome::TargetHit, "done")
            .unwrap();

        adapter
            .upsert_predictions(&[prediction("TCS.NS", date(5), 150.0)])
            .unwrap();
        let stored = &adapter.get_predictions(date(5)).unwrap()[0];
        assert_eq!(stored.levels.entry, 100.0);
        assert!(stored.is_labeled());
    }

    #[test]
    fn labeled_predictions_most_recent_first() {
        let adapter = store();
        for day in 4..=7 {
            adapter
                .upsert_predictions(&[prediction("TCS.NS", date(day), 100.0)])
                .unwrap();
        }
        for day in [4, 5, 7] {
            let id = adapter.get_predictions(date(day)).unwrap()[0].id.unwrap();
            adapter
                .update_outcome(id, &realized(), Outcome::TargetHit, "")
                .unwrap();
        }

        let labeled = adapter.get_labeled_predictions(2).unwrap();
        let dates: Vec<_> = labeled.iter().map(|p| p.target_date).collect();
        assert_eq!(dates, vec![date(7), date(5)]);
    }

    #[test]
    fn recent_win_rate_averages_last_cycles() {
        let adapter = store();
        assert_eq!(adapter.get_recent_win_rate(5).unwrap(), None);

        for (day, rate) in [(1, 0.9), (2, 0.2), (3, 0.4), (4, 0.6)] {
            adapter.append_metric(&metric(day, rate)).unwrap();
        }
        let avg = adapter.get_recent_win_rate(3).unwrap().unwrap();
        assert!((avg - 0.4).abs() < 1e-9);
        assert_eq!(adapter.get_recent_win_rate(0).unwrap(), None);
    }

    #[test]
    fn metrics_history_round_trips() {
        let adapter = store();
        adapter.append_metric(&metric(1, 0.25)).unwrap();
        let mut retrained = metric(2, 0.5);
        retrained.retrained = true;
        adapter.append_metric(&retrained).unwrap();

        let history = adapter.get_metrics(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], retrained);
        assert_eq!(history[1], metric(1, 0.25));
    }

    #[test]
    fn has_metric_by_date() {
        let adapter = store();
        assert!(!adapter.has_metric(date(1)).unwrap());
        adapter.append_metric(&metric(1, 0.25)).unwrap();
        assert!(adapter.has_metric(date(1)).unwrap());
        assert!(!adapter.has_metric(date(2)).unwrap());
    }
}

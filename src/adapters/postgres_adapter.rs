//! PostgreSQL store and bar source.

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
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use std::cell::RefCell;

const PREDICTION_COLUMNS: &str = "id, instrument, issued_date, target_date, entry, target, stop_loss, \
     volatility_unit, volatility_multiplier, score, realized_open, realized_high, realized_low, \
     realized_close, realized_volume, outcome, rationale";

pub struct PostgresAdapter {
    client: RefCell<Client>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BreakoutError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| BreakoutError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let client = Client::connect(&connection_string, NoTls).map_err(|e| BreakoutError::Database {
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: RefCell::new(client),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), BreakoutError> {
        self.client
            .borrow_mut()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS ohlcv (
                    instrument TEXT NOT NULL,
                    date DATE NOT NULL,
                    open DOUBLE PRECISION NOT NULL,
                    high DOUBLE PRECISION NOT NULL,
                    low DOUBLE PRECISION NOT NULL,
                    close DOUBLE PRECISION NOT NULL,
                    volume BIGINT NOT NULL,
                    PRIMARY KEY (instrument, date)
                );
                CREATE TABLE IF NOT EXISTS predictions (
                    id BIGSERIAL PRIMARY KEY,
                    instrument TEXT NOT NULL,
                    issued_date DATE NOT NULL,
                    target_date DATE NOT NULL,
                    entry DOUBLE PRECISION NOT NULL,
                    target DOUBLE PRECISION NOT NULL,
                    stop_loss DOUBLE PRECISION NOT NULL,
                    volatility_unit DOUBLE PRECISION NOT NULL,
                    volatility_multiplier DOUBLE PRECISION NOT NULL,
                    score DOUBLE PRECISION NOT NULL,
                    realized_open DOUBLE PRECISION,
                    realized_high DOUBLE PRECISION,
                    realized_low DOUBLE PRECISION,
                    realized_close DOUBLE PRECISION,
                    realized_volume BIGINT,
                    outcome TEXT,
                    rationale TEXT,
                    UNIQUE (instrument, target_date)
                );
                CREATE INDEX IF NOT EXISTS idx_predictions_target_date ON predictions(target_date);
                CREATE TABLE IF NOT EXISTS model_params (
                    name TEXT PRIMARY KEY,
                    value DOUBLE PRECISION NOT NULL
                );
                CREATE TABLE IF NOT EXISTS model_metrics (
                    id BIGSERIAL PRIMARY KEY,
                    date DATE NOT NULL,
                    total BIGINT NOT NULL,
                    target_hit BIGINT NOT NULL,
                    stop_loss_hit BIGINT NOT NULL,
                    no_entry BIGINT NOT NULL,
                    stagnant BIGINT NOT NULL,
                    win_rate DOUBLE PRECISION NOT NULL,
                    retrained BOOLEAN NOT NULL
                );",
            )
            .map_err(query_error)
    }

    pub fn seed_params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_error)?;
        for (name, value) in params.to_entries() {
            tx.execute(
                "INSERT INTO model_params (name, value) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
                &[&name, &value],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    pub fn insert_bars(&self, bars: &[Bar]) -> Result<usize, BreakoutError> {
        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_error)?;
        for bar in bars {
            tx.execute(
                "INSERT INTO ohlcv (instrument, date, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (instrument, date) DO UPDATE SET
                     open = excluded.open, high = excluded.high, low = excluded.low,
                     close = excluded.close, volume = excluded.volume",
                &[
                    &bar.instrument,
                    &bar.date,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.volume,
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
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Prediction>, BreakoutError> {
        let rows = self
            .client
            .borrow_mut()
            .query(sql, params)
            .map_err(query_error)?;
        rows.iter().map(prediction_from_row).collect()
    }
}

impl BarSource for PostgresAdapter {
    fn fetch_daily_bars(
        &self,
        instrument: &str,
        as_of: NaiveDate,
        lookback_days: usize,
    ) -> Result<Vec<Bar>, BreakoutError> {
        let query = "SELECT instrument, date, open, high, low, close, volume FROM (
                         SELECT * FROM ohlcv
                         WHERE instrument = $1 AND date <= $2
                         ORDER BY date DESC
                         LIMIT $3
                     ) recent ORDER BY date ASC";

        let limit = lookback_days as i64;
        let rows = self
            .client
            .borrow_mut()
            .query(query, &[&instrument, &as_of, &limit])
            .map_err(|e| BreakoutError::BarSource {
                instrument: instrument.to_string(),
                reason: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|row| Bar {
                instrument: row.get(0),
                date: row.get(1),
                open: row.get(2),
                high: row.get(3),
                low: row.get(4),
                close: row.get(5),
                volume: row.get(6),
            })
            .collect())
    }
}

impl RecordStore for PostgresAdapter {
    fn get_params(&self) -> Result<ModelParams, BreakoutError> {
        let rows = self
            .client
            .borrow_mut()
            .query("SELECT name, value FROM model_params", &[])
            .map_err(query_error)?;
        let entries: Vec<(String, f64)> = rows.iter().map(|row| (row.get(0), row.get(1))).collect();
        Ok(ModelParams::default().with_entries(entries.iter().map(|(n, v)| (n.as_str(), *v))))
    }

    fn set_params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_error)?;
        for (name, value) in params.to_entries() {
            tx.execute(
                "INSERT INTO model_params (name, value) VALUES ($1, $2)
                 ON CONFLICT (name) DO UPDATE SET value = excluded.value",
                &[&name, &value],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<(), BreakoutError> {
        let mut client = self.client.borrow_mut();
        let mut tx = client.transaction().map_err(query_error)?;
        for p in predictions {
            tx.execute(
                "INSERT INTO predictions (instrument, issued_date, target_date, entry, target,
                     stop_loss, volatility_unit, volatility_multiplier, score)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (instrument, target_date) DO UPDATE SET
                     issued_date = excluded.issued_date,
                     entry = excluded.entry,
                     target = excluded.target,
                     stop_loss = excluded.stop_loss,
                     volatility_unit = excluded.volatility_unit,
                     volatility_multiplier = excluded.volatility_multiplier,
                     score = excluded.score
                 WHERE predictions.outcome IS NULL",
                &[
                    &p.instrument,
                    &p.issued_date,
                    &p.target_date,
                    &p.levels.entry,
                    &p.levels.target,
                    &p.levels.stop_loss,
                    &p.levels.volatility_unit,
                    &p.volatility_multiplier,
                    &p.score,
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    fn get_predictions(&self, target_date: NaiveDate) -> Result<Vec<Prediction>, BreakoutError> {
        let sql = format!(
            "SELECT {} FROM predictions WHERE target_date = $1 ORDER BY score DESC, id ASC",
            PREDICTION_COLUMNS
        );
        self.query_predictions(&sql, &[&target_date])
    }

    fn update_outcome(
        &self,
        prediction_id: i64,
        realized: &RealizedBar,
        label: Outcome,
        rationale: &str,
    ) -> Result<(), BreakoutError> {
        let mut client = self.client.borrow_mut();
        let changed = client
            .execute(
                "UPDATE predictions SET
                     realized_open = $2, realized_high = $3, realized_low = $4,
                     realized_close = $5, realized_volume = $6, outcome = $7, rationale = $8
                 WHERE id = $1 AND outcome IS NULL",
                &[
                    &prediction_id,
                    &realized.open,
                    &realized.high,
                    &realized.low,
                    &realized.close,
                    &realized.volume,
                    &label.as_str(),
                    &rationale,
                ],
            )
            .map_err(query_error)?;

        if changed == 1 {
            return Ok(());
        }

        let exists = client
            .query_opt("SELECT 1 FROM predictions WHERE id = $1", &[&prediction_id])
            .map_err(query_error)?;
        match exists {
            Some(_) => Err(BreakoutError::OutcomeAlreadyRecorded { id: prediction_id }),
            None => Err(BreakoutError::PredictionNotFound { id: prediction_id }),
        }
    }

    fn get_recent_win_rate(&self, cycles: usize) -> Result<Option<f64>, BreakoutError> {
        if cycles == 0 {
            return Ok(None);
        }
        let limit = cycles as i64;
        let row = self
            .client
            .borrow_mut()
            .query_one(
                "SELECT AVG(win_rate) FROM (
                     SELECT win_rate FROM model_metrics ORDER BY date DESC, id DESC LIMIT $1
                 ) recent",
                &[&limit],
            )
            .map_err(query_error)?;
        Ok(row.get::<_, Option<f64>>(0))
    }

    fn get_labeled_predictions(&self, limit: usize) -> Result<Vec<Prediction>, BreakoutError> {
        let sql = format!(
            "SELECT {} FROM predictions WHERE outcome IS NOT NULL
             ORDER BY target_date DESC, id DESC LIMIT $1",
            PREDICTION_COLUMNS
        );
        self.query_predictions(&sql, &[&(limit as i64)])
    }

    fn append_metric(&self, metric: &EvaluationMetric) -> Result<(), BreakoutError> {
        self.client
            .borrow_mut()
            .execute(
                "INSERT INTO model_metrics (date, total, target_hit, stop_loss_hit, no_entry,
                     stagnant, win_rate, retrained)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &metric.date,
                    &(metric.total as i64),
                    &(metric.counts.target_hit as i64),
                    &(metric.counts.stop_loss_hit as i64),
                    &(metric.counts.no_entry as i64),
                    &(metric.counts.stagnant as i64),
                    &metric.win_rate,
                    &metric.retrained,
                ],
            )
            .map_err(query_error)?;
        Ok(())
    }

    fn has_metric(&self, date: NaiveDate) -> Result<bool, BreakoutError> {
        let row = self
            .client
            .borrow_mut()
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM model_metrics WHERE date = $1)",
                &[&date],
            )
            .map_err(query_error)?;
        Ok(row.get::<_, bool>(0))
    }

    fn get_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>, BreakoutError> {
        let rows = self
            .client
            .borrow_mut()
            .query(
                "SELECT date, total, target_hit, stop_loss_hit, no_entry, stagnant, win_rate, retrained
                 FROM model_metrics ORDER BY date DESC, id DESC LIMIT $1",
                &[&(limit as i64)],
            )
            .map_err(query_error)?;

        Ok(rows
            .iter()
            .map(|row| EvaluationMetric {
                date: row.get(0),
                total: row.get::<_, i64>(1) as usize,
                counts: OutcomeCounts {
                    target_hit: row.get::<_, i64>(2) as usize,
                    stop_loss_hit: row.get::<_, i64>(3) as usize,
                    no_entry: row.get::<_, i64>(4) as usize,
                    stagnant: row.get::<_, i64>(5) as usize,
                },
                win_rate: row.get(6),
                retrained: row.get(7),
            })
            .collect())
    }
}

fn query_error(e: postgres::Error) -> BreakoutError {
    BreakoutError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn prediction_from_row(row: &Row) -> Result<Prediction, BreakoutError> {
    let label: Option<String> = row.get(15);
    let outcome = match label {
        Some(label) => Some(RecordedOutcome {
            realized: RealizedBar {
                open: row.get(10),
                high: row.get(11),
                low: row.get(12),
                close: row.get(13),
                volume: row.get(14),
            },
            label: label.parse::<Outcome>().map_err(|e| BreakoutError::DatabaseQuery {
                reason: e.to_string(),
            })?,
            rationale: row.get::<_, Option<String>>(16).unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Prediction {
        id: Some(row.get(0)),
        instrument: row.get(1),
        issued_date: row.get(2),
        target_date: row.get(3),
        levels: PriceLevels {
            entry: row.get(4),
            target: row.get(5),
            stop_loss: row.get(6),
            volatility_unit: row.get(7),
        },
        volatility_multiplier: row.get(8),
        score: row.get(9),
        outcome,
    })
}

//! Scoring and analysis cycles over an in-memory SQLite store.
//!
//! Tests cover:
//! - Candidate selection and persisted levels
//! - Idempotent re-scoring
//! - Bar source failures (partial and total)
//! - Outcome labeling, rationale and metrics
//! - Retraining trigger and the ten-sample boundary

#![cfg(feature = "sqlite")]

mod common;

use approx::assert_abs_diff_eq;
use breakout::adapters::sqlite_adapter::SqliteAdapter;
use breakout::domain::cycle::{Cycle, CycleSettings};
use breakout::domain::error::BreakoutError;
use breakout::domain::levels::PriceLevels;
use breakout::domain::outcome::Outcome;
use breakout::domain::params::ModelParams;
use breakout::domain::prediction::{EvaluationMetric, OutcomeCounts, Prediction, RealizedBar};
use breakout::domain::scorer::MAX_SCORE;
use breakout::ports::store_port::RecordStore;
use chrono::{Duration, NaiveDate};
use common::*;

fn issued() -> NaiveDate {
    date(2024, 6, 7)
}

fn target() -> NaiveDate {
    date(2024, 6, 10)
}

fn store() -> SqliteAdapter {
    let store = SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store.seed_params(&ModelParams::default()).unwrap();
    store
}

fn codes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn score_once(source: &MockBarSource, store: &SqliteAdapter, universe: &[String]) -> Vec<Prediction> {
    Cycle::new(source, store, universe, CycleSettings::default())
        .run_scoring_cycle(target(), issued())
        .unwrap()
}

mod scoring {
    use super::*;

    #[test]
    fn bullish_setup_scores_max_and_is_selected() {
        let source = MockBarSource::new()
            .with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60))
            .with_bars("ITC.NS", bearish_bars("ITC.NS", issued(), 60));
        let store = store();
        store
            .set_params(&ModelParams {
                score_threshold: 10.0,
                ..ModelParams::default()
            })
            .unwrap();
        let universe = codes(&["ITC.NS", "TCS.NS"]);

        let predictions = score_once(&source, &store, &universe);
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.instrument, "TCS.NS");
        assert_eq!(p.score, MAX_SCORE);
        assert_eq!(p.issued_date, issued());
        assert_eq!(p.target_date, target());
        assert_eq!(p.volatility_multiplier, 1.5);
    }

    #[test]
    fn levels_follow_twenty_day_high_and_atr() {
        let source = MockBarSource::new().with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        let store = store();
        let universe = codes(&["TCS.NS"]);

        let p = &score_once(&source, &store, &universe)[0];
        // last close 110.2, 20-day high 111.2, ATR 2.35
        assert_abs_diff_eq!(p.levels.volatility_unit, 2.35, epsilon = 1e-9);
        assert_abs_diff_eq!(p.levels.entry, 111.2, epsilon = 1e-9);
        assert!(p.levels.stop_loss < p.levels.entry && p.levels.entry < p.levels.target);
        assert_abs_diff_eq!(p.levels.risk(), 3.52, epsilon = 0.011);
        assert_abs_diff_eq!(p.levels.reward(), 2.0 * p.levels.risk(), epsilon = 0.011);
    }

    #[test]
    fn predictions_are_persisted_unlabeled() {
        let source = MockBarSource::new().with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        let store = store();
        let universe = codes(&["TCS.NS"]);
        score_once(&source, &store, &universe);

        let stored = store.get_predictions(target()).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].id.is_some());
        assert!(!stored[0].is_labeled());
    }

    #[test]
    fn rescoring_is_idempotent() {
        let source = MockBarSource::new()
            .with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60))
            .with_bars("INFY.NS", bullish_bars("INFY.NS", issued(), 45));
        let store = store();
        let universe = codes(&["TCS.NS", "INFY.NS"]);

        let first = score_once(&source, &store, &universe);
        let stored_first = store.get_predictions(target()).unwrap();
        let second = score_once(&source, &store, &universe);
        let stored_second = store.get_predictions(target()).unwrap();

        assert_eq!(first, second);
        assert_eq!(stored_first, stored_second);
        assert_eq!(stored_second.len(), 2);
    }

    #[test]
    fn nothing_qualifies_is_empty() {
        let source = MockBarSource::new().with_bars("ITC.NS", bearish_bars("ITC.NS", issued(), 60));
        let store = store();
        let universe = codes(&["ITC.NS"]);

        assert!(score_once(&source, &store, &universe).is_empty());
        assert!(store.get_predictions(target()).unwrap().is_empty());
    }

    #[test]
    fn short_history_is_skipped() {
        let source = MockBarSource::new()
            .with_bars("NEW.NS", bullish_bars("NEW.NS", issued(), 29))
            .with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        let store = store();
        let universe = codes(&["NEW.NS", "TCS.NS"]);

        let predictions = score_once(&source, &store, &universe);
        let names: Vec<_> = predictions.iter().map(|p| p.instrument.as_str()).collect();
        assert_eq!(names, vec!["TCS.NS"]);
    }

    #[test]
    fn malformed_series_is_skipped() {
        let mut bad = bullish_bars("BAD.NS", issued(), 60);
        bad[10].low = bad[10].high + 5.0;
        let source = MockBarSource::new()
            .with_bars("BAD.NS", bad)
            .with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        let store = store();
        let universe = codes(&["BAD.NS", "TCS.NS"]);

        let predictions = score_once(&source, &store, &universe);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].instrument, "TCS.NS");
    }

    #[test]
    fn partial_fetch_failure_continues() {
        let source = MockBarSource::new()
            .with_error("DOWN.NS", "timeout")
            .with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        let store = store();
        let universe = codes(&["DOWN.NS", "TCS.NS"]);

        let predictions = score_once(&source, &store, &universe);
        assert_eq!(predictions.len(), 1);
    }

    #[test]
    fn total_fetch_failure_is_fatal_and_persists_nothing() {
        let source = MockBarSource::new()
            .with_error("TCS.NS", "timeout")
            .with_error("INFY.NS", "timeout");
        let store = store();
        let universe = codes(&["TCS.NS", "INFY.NS"]);

        let err = Cycle::new(&source, &store, &universe, CycleSettings::default())
            .run_scoring_cycle(target(), issued())
            .unwrap_err();
        assert!(matches!(err, BreakoutError::BarSourceUnavailable { failed: 2 }));
        assert!(store.get_predictions(target()).unwrap().is_empty());
    }

    #[test]
    fn selection_count_truncates() {
        let names = ["A.NS", "B.NS", "C.NS"];
        let mut source = MockBarSource::new();
        for name in names {
            source = source.with_bars(name, bullish_bars(name, issued(), 60));
        }
        let store = store();
        store
            .set_params(&ModelParams {
                selection_count: 2,
                ..ModelParams::default()
            })
            .unwrap();
        let universe = codes(&names);

        let predictions = score_once(&source, &store, &universe);
        let picked: Vec<_> = predictions.iter().map(|p| p.instrument.as_str()).collect();
        // equal scores keep universe order
        assert_eq!(picked, vec!["A.NS", "B.NS"]);
    }
}

mod analysis {
    use super::*;

    fn analyze(source: &MockBarSource, store: &SqliteAdapter, universe: &[String]) -> breakout::domain::cycle::AnalysisReport {
        Cycle::new(source, store, universe, CycleSettings::default())
            .run_analysis_cycle(target())
            .unwrap()
    }

    fn scored(names: &[&str]) -> (SqliteAdapter, Vec<String>) {
        let mut source = MockBarSource::new();
        for name in names {
            source = source.with_bars(name, bullish_bars(name, issued(), 60));
        }
        let store = store();
        let universe = codes(names);
        score_once(&source, &store, &universe);
        (store, universe)
    }

    fn with_sessions(names: &[&str], sessions: Vec<Bar>) -> MockBarSource {
        let mut source = MockBarSource::new();
        for name in names {
            source = source.with_bars(name, bullish_bars(name, issued(), 60));
        }
        for s in sessions {
            let name = s.instrument.clone();
            source = source.with_bars(&name, vec![s]);
        }
        source
    }

    #[test]
    fn labels_each_outcome_and_appends_metric() {
        let names = ["HIT.NS", "STOP.NS", "MISS.NS", "FLAT.NS"];
        let (store, universe) = scored(&names);
        // entry 111.2, stop ~107.68, target ~118.24
        let source = with_sessions(
            &names,
            vec![
                session("HIT.NS", target(), 120.0, 110.0, 119.0),
                session("STOP.NS", target(), 112.0, 105.0, 106.0),
                session("MISS.NS", target(), 110.0, 108.0, 109.0),
                session("FLAT.NS", target(), 115.0, 109.0, 113.0),
            ],
        );

        let report = analyze(&source, &store, &universe);
        assert_eq!(report.predictions.len(), 4);
        for p in &report.predictions {
            let outcome = p.outcome.as_ref().unwrap();
            let expected = match p.instrument.as_str() {
                "HIT.NS" => Outcome::TargetHit,
                "STOP.NS" => Outcome::StopLossHit,
                "MISS.NS" => Outcome::NoEntry,
                _ => Outcome::Stagnant,
            };
            assert_eq!(outcome.label, expected, "{}", p.instrument);
            assert!(!outcome.rationale.is_empty());
        }

        let metric = report.metric.unwrap();
        assert_eq!(metric.total, 4);
        assert_eq!(metric.win_rate, 0.25);
        assert_eq!(
            metric.counts,
            OutcomeCounts {
                target_hit: 1,
                stop_loss_hit: 1,
                no_entry: 1,
                stagnant: 1,
            }
        );
        // 0.25 < 0.40 but only four labeled pairs exist
        assert!(!metric.retrained);
        assert!(report.retrain.is_none());

        let history = store.get_metrics(10).unwrap();
        assert_eq!(history, vec![metric]);
    }

    #[test]
    fn stored_outcomes_carry_realized_session() {
        let (store, universe) = scored(&["HIT.NS"]);
        let source = with_sessions(&["HIT.NS"], vec![session("HIT.NS", target(), 120.0, 110.0, 119.0)]);
        analyze(&source, &store, &universe);

        let stored = &store.get_predictions(target()).unwrap()[0];
        let outcome = stored.outcome.as_ref().unwrap();
        assert_eq!(outcome.label, Outcome::TargetHit);
        assert_eq!(outcome.realized.high, 120.0);
        assert_eq!(outcome.realized.low, 110.0);
        assert_eq!(outcome.realized.close, 119.0);
        assert!(outcome.rationale.contains("past the target"));
    }

    #[test]
    fn second_pass_does_not_relabel() {
        let (store, universe) = scored(&["HIT.NS"]);
        let source = with_sessions(&["HIT.NS"], vec![session("HIT.NS", target(), 120.0, 110.0, 119.0)]);
        analyze(&source, &store, &universe);

        let again = analyze(&source, &store, &universe);
        assert!(again.predictions.is_empty());
        assert!(again.metric.is_none());
        assert_eq!(store.get_metrics(10).unwrap().len(), 1);
    }

    #[test]
    fn missing_session_stays_unlabeled() {
        let (store, universe) = scored(&["HIT.NS", "GAP.NS"]);
        let source = with_sessions(
            &["HIT.NS", "GAP.NS"],
            vec![session("HIT.NS", target(), 120.0, 110.0, 119.0)],
        );

        let report = analyze(&source, &store, &universe);
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.predictions[0].instrument, "HIT.NS");

        let gap = store
            .get_predictions(target())
            .unwrap()
            .into_iter()
            .find(|p| p.instrument == "GAP.NS")
            .unwrap();
        assert!(!gap.is_labeled());
    }

    #[test]
    fn intraday_bars_stand_in_for_missing_daily_bar() {
        let (store, universe) = scored(&["LATE.NS"]);
        let intraday = vec![
            session("LATE.NS", target(), 111.0, 109.0, 110.5),
            session("LATE.NS", target(), 111.5, 110.0, 111.0),
            session("LATE.NS", target(), 111.3, 110.2, 110.8),
            session("LATE.NS", target(), 111.1, 110.1, 110.9),
            session("LATE.NS", target(), 119.0, 110.8, 118.5),
        ];
        let source = with_sessions(&["LATE.NS"], Vec::new()).with_intraday("LATE.NS", target(), intraday);

        let report = analyze(&source, &store, &universe);
        let outcome = report.predictions[0].outcome.as_ref().unwrap();
        assert_eq!(outcome.label, Outcome::TargetHit);
        assert_eq!(outcome.realized.high, 119.0);
        assert!(outcome.rationale.ends_with("Late-session breakout confirmed strength."));
    }

    #[test]
    fn trend_context_includes_the_realized_session() {
        let store = store();
        let universe = codes(&["ITC.NS"]);
        store
            .upsert_predictions(&[Prediction {
                id: None,
                instrument: "ITC.NS".into(),
                issued_date: issued(),
                target_date: target(),
                levels: PriceLevels {
                    entry: 130.0,
                    target: 160.0,
                    stop_loss: 115.0,
                    volatility_unit: 10.0,
                },
                volatility_multiplier: 1.5,
                score: 5.0,
                outcome: None,
            }])
            .unwrap();
        // downtrend history, then a session that gaps far above it
        let source = MockBarSource::new()
            .with_bars("ITC.NS", bearish_bars("ITC.NS", issued(), 60))
            .with_bars("ITC.NS", vec![session("ITC.NS", target(), 310.0, 290.0, 300.0)]);

        let report = analyze(&source, &store, &universe);
        let outcome = report.predictions[0].outcome.as_ref().unwrap();
        assert_eq!(outcome.label, Outcome::TargetHit);
        assert!(outcome.rationale.contains("Trend: mild uptrend (EMA9 above EMA21)"));
    }

    #[test]
    fn total_fetch_failure_is_fatal_and_labels_nothing() {
        let (store, universe) = scored(&["TCS.NS", "INFY.NS"]);
        let source = MockBarSource::new()
            .with_error("TCS.NS", "timeout")
            .with_error("INFY.NS", "timeout");

        let err = Cycle::new(&source, &store, &universe, CycleSettings::default())
            .run_analysis_cycle(target())
            .unwrap_err();
        assert!(matches!(err, BreakoutError::BarSourceUnavailable { failed: 2 }));
        assert!(store.get_predictions(target()).unwrap().iter().all(|p| !p.is_labeled()));
        assert!(store.get_metrics(10).unwrap().is_empty());
    }

    #[test]
    fn partial_fetch_failure_labels_the_rest() {
        let (store, universe) = scored(&["HIT.NS", "DOWN.NS"]);
        let source = with_sessions(&["HIT.NS"], vec![session("HIT.NS", target(), 120.0, 110.0, 119.0)])
            .with_error("DOWN.NS", "timeout");

        let report = analyze(&source, &store, &universe);
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.metric.unwrap().total, 1);
    }

    /// Store whose metric writes always fail.
    struct BrokenMetrics<'a>(&'a SqliteAdapter);

    impl RecordStore for BrokenMetrics<'_> {
        fn get_params(&self) -> Result<ModelParams, BreakoutError> {
            self.0.get_params()
        }
        fn set_params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
            self.0.set_params(params)
        }
        fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<(), BreakoutError> {
            self.0.upsert_predictions(predictions)
        }
        fn get_predictions(&self, target_date: NaiveDate) -> Result<Vec<Prediction>, BreakoutError> {
            self.0.get_predictions(target_date)
        }
        fn update_outcome(
            &self,
            prediction_id: i64,
            realized: &RealizedBar,
            label: Outcome,
            rationale: &str,
        ) -> Result<(), BreakoutError> {
            self.0.update_outcome(prediction_id, realized, label, rationale)
        }
        fn get_recent_win_rate(&self, cycles: usize) -> Result<Option<f64>, BreakoutError> {
            self.0.get_recent_win_rate(cycles)
        }
        fn get_labeled_predictions(&self, limit: usize) -> Result<Vec<Prediction>, BreakoutError> {
            self.0.get_labeled_predictions(limit)
        }
        fn append_metric(&self, _metric: &EvaluationMetric) -> Result<(), BreakoutError> {
            Err(BreakoutError::DatabaseQuery {
                reason: "disk I/O error".into(),
            })
        }
        fn has_metric(&self, date: NaiveDate) -> Result<bool, BreakoutError> {
            self.0.has_metric(date)
        }
        fn get_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>, BreakoutError> {
            self.0.get_metrics(limit)
        }
    }

    #[test]
    fn metric_lost_to_a_failed_write_is_recovered_on_rerun() {
        let (store, universe) = scored(&["HIT.NS", "STOP.NS"]);
        let source = with_sessions(
            &["HIT.NS", "STOP.NS"],
            vec![
                session("HIT.NS", target(), 120.0, 110.0, 119.0),
                session("STOP.NS", target(), 112.0, 105.0, 106.0),
            ],
        );

        let broken = BrokenMetrics(&store);
        let err = Cycle::new(&source, &broken, &universe, CycleSettings::default())
            .run_analysis_cycle(target())
            .unwrap_err();
        assert!(matches!(err, BreakoutError::DatabaseQuery { .. }));
        assert!(store.get_predictions(target()).unwrap().iter().all(|p| p.is_labeled()));
        assert!(store.get_metrics(10).unwrap().is_empty());

        let report = analyze(&source, &store, &universe);
        assert!(report.predictions.is_empty());
        let metric = report.metric.unwrap();
        assert_eq!(metric.total, 2);
        assert_eq!(metric.counts.target_hit, 1);
        assert_eq!(metric.counts.stop_loss_hit, 1);
        assert_eq!(metric.win_rate, 0.5);
        assert_eq!(store.get_metrics(10).unwrap(), vec![metric]);

        let again = analyze(&source, &store, &universe);
        assert!(again.metric.is_none());
        assert_eq!(store.get_metrics(10).unwrap().len(), 1);
    }
}

mod retraining {
    use super::*;

    /// Labeled pair that wins only with a stop at least 1.6 units wide:
    /// entry 100, stop 85 at multiplier 1.5, session high 130 and low 84.
    fn seed_labeled(store: &SqliteAdapter, count: usize) {
        for i in 0..count {
            let target_date = date(2024, 3, 1) + Duration::days(i as i64);
            let prediction = Prediction {
                id: None,
                instrument: format!("OLD{}.NS", i),
                issued_date: target_date - Duration::days(1),
                target_date,
                levels: PriceLevels {
                    entry: 100.0,
                    target: 130.0,
                    stop_loss: 85.0,
                    volatility_unit: 10.0,
                },
                volatility_multiplier: 1.5,
                score: 6.0,
                outcome: None,
            };
            store.upsert_predictions(&[prediction]).unwrap();
            let id = store.get_predictions(target_date).unwrap()[0].id.unwrap();
            let realized = RealizedBar {
                open: 99.0,
                high: 130.0,
                low: 84.0,
                close: 120.0,
                volume: 1000,
            };
            store
                .update_outcome(id, &realized, Outcome::StopLossHit, "seeded")
                .unwrap();
        }
    }

    /// Score one bullish instrument, then stop it out hard on the target day.
    fn run_losing_cycle(store: &SqliteAdapter) -> breakout::domain::cycle::AnalysisReport {
        let universe = codes(&["TCS.NS"]);
        let source = MockBarSource::new().with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        score_once(&source, store, &universe);

        let source = source.with_bars("TCS.NS", vec![session("TCS.NS", target(), 112.0, 90.0, 95.0)]);
        Cycle::new(&source, store, &universe, CycleSettings::default())
            .run_analysis_cycle(target())
            .unwrap()
    }

    #[test]
    fn nine_pairs_do_not_retrain() {
        let store = store();
        seed_labeled(&store, 8);

        let report = run_losing_cycle(&store);
        assert_eq!(report.metric.as_ref().unwrap().win_rate, 0.0);
        assert!(report.retrain.is_none());
        assert!(!report.metric.unwrap().retrained);
        assert_eq!(store.get_params().unwrap(), ModelParams::default());
    }

    #[test]
    fn ten_pairs_retrain_and_write_back() {
        let store = store();
        store
            .set_params(&ModelParams {
                score_threshold: 3.5,
                selection_count: 4,
                ..ModelParams::default()
            })
            .unwrap();
        seed_labeled(&store, 9);

        let report = run_losing_cycle(&store);
        let retrain = report.retrain.as_ref().unwrap();
        assert_eq!(retrain.samples, 10);
        assert_eq!(retrain.best.multiplier, 1.65);
        assert_eq!(retrain.best.ratio, 1.5);
        assert_eq!(retrain.best.wins, 9);
        assert!(report.metric.as_ref().unwrap().retrained);

        let params = store.get_params().unwrap();
        assert_eq!(params.volatility_multiplier, 1.65);
        assert_eq!(params.reward_risk_ratio, 1.5);
        assert_eq!(params.score_threshold, 3.5);
        assert_eq!(params.selection_count, 4);
    }

    #[test]
    fn retuned_params_apply_to_next_scoring_cycle() {
        let store = store();
        seed_labeled(&store, 9);
        run_losing_cycle(&store);

        let universe = codes(&["INFY.NS"]);
        let next_issued = target();
        let source = MockBarSource::new().with_bars("INFY.NS", bullish_bars("INFY.NS", next_issued, 60));
        let predictions = Cycle::new(&source, &store, &universe, CycleSettings::default())
            .run_scoring_cycle(date(2024, 6, 11), next_issued)
            .unwrap();
        assert_eq!(predictions[0].volatility_multiplier, 1.65);
        let levels = predictions[0].levels;
        assert_abs_diff_eq!(levels.reward(), 1.5 * levels.risk(), epsilon = 0.011);
    }

    #[test]
    fn trailing_win_rate_can_trigger_retraining() {
        let store = store();
        seed_labeled(&store, 9);
        for day in 1..=5 {
            store
                .append_metric(&EvaluationMetric {
                    date: date(2024, 5, day),
                    total: 5,
                    counts: OutcomeCounts {
                        target_hit: 1,
                        stop_loss_hit: 4,
                        no_entry: 0,
                        stagnant: 0,
                    },
                    win_rate: 0.2,
                    retrained: false,
                })
                .unwrap();
        }

        let universe = codes(&["TCS.NS"]);
        let source = MockBarSource::new().with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        score_once(&source, &store, &universe);
        let source = source.with_bars("TCS.NS", vec![session("TCS.NS", target(), 125.0, 110.0, 124.0)]);
        let report = Cycle::new(&source, &store, &universe, CycleSettings::default())
            .run_analysis_cycle(target())
            .unwrap();

        assert_eq!(report.metric.as_ref().unwrap().win_rate, 1.0);
        assert!(report.retrain.is_some());
    }

    #[test]
    fn healthy_accuracy_skips_retraining() {
        let store = store();
        seed_labeled(&store, 12);

        let universe = codes(&["TCS.NS"]);
        let source = MockBarSource::new().with_bars("TCS.NS", bullish_bars("TCS.NS", issued(), 60));
        score_once(&source, &store, &universe);
        let source = source.with_bars("TCS.NS", vec![session("TCS.NS", target(), 125.0, 110.0, 124.0)]);
        let report = Cycle::new(&source, &store, &universe, CycleSettings::default())
            .run_analysis_cycle(target())
            .unwrap();

        assert!(report.retrain.is_none());
        assert_eq!(store.get_params().unwrap(), ModelParams::default());
    }
}

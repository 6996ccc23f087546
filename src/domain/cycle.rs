//! Scoring and analysis cycles.
//!
//! A scoring cycle ranks the universe and persists levels for the next
//! session. An analysis cycle labels the predictions that targeted a session,
//! appends an evaluation metric and, when accuracy has slipped, retunes the
//! level parameters for future cycles.

use crate::domain::error::BreakoutError;
use crate::domain::levels::calculate_levels;
use crate::domain::ohlcv::Bar;
use crate::domain::outcome::classify;
use crate::domain::prediction::{EvaluationMetric, OutcomeCounts, Prediction, RealizedBar, RecordedOutcome};
use crate::domain::rationale::{explain, Context};
use crate::domain::retrain::{self, optimize, should_retrain, RetrainResult, RetrainSample};
use crate::domain::scorer::{select_top, ScoreCard, ScoredCandidate, MIN_BARS};
use crate::ports::bar_port::BarSource;
use crate::ports::store_port::RecordStore;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub const DEFAULT_LOOKBACK_DAYS: usize = 60;
/// Daily bars fetched around a target session for grading.
const ANALYSIS_LOOKBACK_DAYS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    pub lookback_days: usize,
    pub accuracy_threshold: f64,
    pub trailing_cycles: usize,
    pub retrain_window: usize,
    pub min_retrain_samples: usize,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            accuracy_threshold: retrain::DEFAULT_ACCURACY_THRESHOLD,
            trailing_cycles: retrain::DEFAULT_TRAILING_CYCLES,
            retrain_window: retrain::DEFAULT_WINDOW,
            min_retrain_samples: retrain::DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Result of one analysis pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub date: NaiveDate,
    /// Predictions labeled by this pass.
    pub predictions: Vec<Prediction>,
    /// Appended metric; `None` when nothing was labeled.
    pub metric: Option<EvaluationMetric>,
    /// Grid search result when parameters were rewritten.
    pub retrain: Option<RetrainResult>,
}

pub struct Cycle<'a> {
    bars: &'a dyn BarSource,
    store: &'a dyn RecordStore,
    universe: &'a [String],
    settings: CycleSettings,
}

impl<'a> Cycle<'a> {
    pub fn new(
        bars: &'a dyn BarSource,
        store: &'a dyn RecordStore,
        universe: &'a [String],
        settings: CycleSettings,
    ) -> Self {
        Self {
            bars,
            store,
            universe,
            settings,
        }
    }

    /// Score the universe on `issued_date` bars and persist levels for
    /// `target_date`. Persisting happens once, after every instrument was
    /// scored.
    pub fn run_scoring_cycle(
        &self,
        target_date: NaiveDate,
        issued_date: NaiveDate,
    ) -> Result<Vec<Prediction>, BreakoutError> {
        let params = self.store.get_params()?;
        info!(
            "Scoring {} instruments for {} (multiplier={}, ratio={}, threshold={}, count={})",
            self.universe.len(),
            target_date,
            params.volatility_multiplier,
            params.reward_risk_ratio,
            params.score_threshold,
            params.selection_count
        );

        let mut candidates = Vec::new();
        let mut failed = 0usize;

        for instrument in self.universe {
            let bars = match self
                .bars
                .fetch_daily_bars(instrument, issued_date, self.settings.lookback_days)
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!("Skipping {}: {}", instrument, e);
                    failed += 1;
                    continue;
                }
            };

            if bars.is_empty() {
                warn!("Skipping {}: no bars on or before {}", instrument, issued_date);
                continue;
            }
            if let Some(bad) = bars.iter().find(|b| !b.is_well_formed()) {
                warn!("Skipping {}: malformed bar on {}", instrument, bad.date);
                continue;
            }

            let Some(card) = ScoreCard::from_bars(&bars) else {
                debug!(
                    "{} not scoreable ({} bars, need {} with defined RSI and non-zero ATR)",
                    instrument,
                    bars.len(),
                    MIN_BARS
                );
                continue;
            };
            debug!("{} scored {:.2}: {:?}", instrument, card.score, card.snapshot);

            candidates.push(ScoredCandidate {
                instrument: instrument.clone(),
                score: card.score,
                bars,
            });
        }

        if !self.universe.is_empty() && failed == self.universe.len() {
            return Err(BreakoutError::BarSourceUnavailable { failed });
        }

        let scored = candidates.len();
        let selected = select_top(candidates, params.score_threshold, params.selection_count);
        info!(
            "{} of {} scoreable instruments cleared threshold {}",
            selected.len(),
            scored,
            params.score_threshold
        );

        let mut predictions = Vec::with_capacity(selected.len());
        for candidate in selected {
            let Some(levels) = calculate_levels(
                &candidate.bars,
                params.volatility_multiplier,
                params.reward_risk_ratio,
            ) else {
                warn!("Skipping {}: degenerate price levels", candidate.instrument);
                continue;
            };
            debug!(
                "{}: entry={:.2} target={:.2} stop={:.2}",
                candidate.instrument, levels.entry, levels.target, levels.stop_loss
            );
            predictions.push(Prediction {
                id: None,
                instrument: candidate.instrument,
                issued_date,
                target_date,
                levels,
                volatility_multiplier: params.volatility_multiplier,
                score: candidate.score,
                outcome: None,
            });
        }

        if !predictions.is_empty() {
            self.store.upsert_predictions(&predictions)?;
        }
        info!("Persisted {} predictions for {}", predictions.len(), target_date);

        Ok(predictions)
    }

    /// Label every outstanding prediction that targeted `analysis_date`.
    ///
    /// When no metric exists yet for the date, predictions labeled by an
    /// earlier, interrupted pass are counted again so the metric is not lost.
    pub fn run_analysis_cycle(&self, analysis_date: NaiveDate) -> Result<AnalysisReport, BreakoutError> {
        let params = self.store.get_params()?;
        let (done, pending): (Vec<Prediction>, Vec<Prediction>) = self
            .store
            .get_predictions(analysis_date)?
            .into_iter()
            .partition(Prediction::is_labeled);
        info!("Analyzing {} outstanding predictions for {}", pending.len(), analysis_date);

        let mut labeled = Vec::with_capacity(pending.len());
        let mut counts = OutcomeCounts::default();
        let mut failed = 0usize;
        let outstanding = pending.len();

        for mut prediction in pending {
            let Some(id) = prediction.id else {
                warn!("Skipping {}: prediction has no id", prediction.instrument);
                continue;
            };
            let session = match self.realized_session(&prediction.instrument, analysis_date) {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {}: {}", prediction.instrument, e);
                    failed += 1;
                    continue;
                }
            };
            let (realized, daily, intraday) = session;

            let levels = prediction.levels;
            let label = classify(
                levels.entry,
                levels.target,
                levels.stop_loss,
                realized.high,
                realized.low,
            );
            let context = Context::assess(&realized, &daily, &intraday);
            let rationale = explain(label, &levels, &realized, &context);

            self.store.update_outcome(id, &realized, label, &rationale)?;
            debug!("{} -> {}", prediction.instrument, label);

            counts.record(label);
            prediction.outcome = Some(RecordedOutcome {
                realized,
                label,
                rationale,
            });
            labeled.push(prediction);
        }

        if outstanding > 0 && failed == outstanding {
            return Err(BreakoutError::BarSourceUnavailable { failed });
        }

        if !done.is_empty() && !self.store.has_metric(analysis_date)? {
            info!(
                "No metric recorded for {}, counting {} previously labeled predictions",
                analysis_date,
                done.len()
            );
            for outcome in done.iter().filter_map(|p| p.outcome.as_ref()) {
                counts.record(outcome.label);
            }
        }

        let Some(win_rate) = counts.win_rate() else {
            info!("Nothing labeled for {}", analysis_date);
            return Ok(AnalysisReport {
                date: analysis_date,
                predictions: labeled,
                metric: None,
                retrain: None,
            });
        };

        let trailing = self.store.get_recent_win_rate(self.settings.trailing_cycles)?;
        info!(
            "Win rate {:.4} over {} predictions (trailing {:?})",
            win_rate,
            counts.total(),
            trailing
        );

        let mut retrain = None;
        if should_retrain(win_rate, trailing, self.settings.accuracy_threshold) {
            let samples: Vec<RetrainSample> = self
                .store
                .get_labeled_predictions(self.settings.retrain_window)?
                .iter()
                .filter_map(RetrainSample::from_prediction)
                .collect();

            match optimize(&samples, self.settings.min_retrain_samples) {
                Some(result) => {
                    for cell in &result.cells {
                        debug!(
                            "grid multiplier={} ratio={}: {}/{}",
                            cell.multiplier, cell.ratio, cell.wins, cell.total
                        );
                    }
                    let tuned = params.with_tuned(result.best.multiplier, result.best.ratio);
                    self.store.set_params(&tuned)?;
                    info!(
                        "Retrained on {} samples: multiplier {} -> {}, ratio {} -> {} (win rate {:.4})",
                        result.samples,
                        params.volatility_multiplier,
                        tuned.volatility_multiplier,
                        params.reward_risk_ratio,
                        tuned.reward_risk_ratio,
                        result.best.win_rate()
                    );
                    retrain = Some(result);
                }
                None => info!(
                    "Retraining skipped: {} labeled samples, need {}",
                    samples.len(),
                    self.settings.min_retrain_samples
                ),
            }
        }

        let metric = EvaluationMetric {
            date: analysis_date,
            total: counts.total(),
            counts,
            win_rate,
            retrained: retrain.is_some(),
        };
        self.store.append_metric(&metric)?;

        Ok(AnalysisReport {
            date: analysis_date,
            predictions: labeled,
            metric: Some(metric),
            retrain,
        })
    }

    /// Realized session for `date`, the daily bars up to and including it,
    /// and any intraday bars. `Ok(None)` (logged) when the session is missing;
    /// `Err` when the daily fetch itself failed.
    fn realized_session(
        &self,
        instrument: &str,
        date: NaiveDate,
    ) -> Result<Option<(RealizedBar, Vec<Bar>, Vec<Bar>)>, BreakoutError> {
        let daily = self.bars.fetch_daily_bars(instrument, date, ANALYSIS_LOOKBACK_DAYS)?;

        let intraday = match self.bars.fetch_intraday_bars(instrument, date) {
            Ok(bars) => bars,
            Err(e) => {
                debug!("No intraday bars for {}: {}", instrument, e);
                Vec::new()
            }
        };

        let realized = match daily.last() {
            Some(last) if last.date == date => RealizedBar::from(last),
            _ => match RealizedBar::from_intraday(&intraday) {
                Some(realized) => realized,
                None => {
                    warn!("Skipping {}: no realized bar for {}", instrument, date);
                    return Ok(None);
                }
            },
        };

        Ok(Some((realized, daily, intraday)))
    }
}

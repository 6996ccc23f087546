//! Plain-text report written to stdout.

use crate::domain::cycle::AnalysisReport;
use crate::domain::error::BreakoutError;
use crate::domain::params::ModelParams;
use crate::domain::prediction::{EvaluationMetric, Prediction};
use crate::ports::report_port::ReportPort;
use std::fmt::Write as _;
use std::io::Write;

pub struct ConsoleReport;

impl ConsoleReport {
    fn emit(text: &str) -> Result<(), BreakoutError> {
        let mut out = std::io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl ReportPort for ConsoleReport {
    fn predictions(&self, predictions: &[Prediction]) -> Result<(), BreakoutError> {
        Self::emit(&render_predictions(predictions))
    }

    fn analysis(&self, report: &AnalysisReport) -> Result<(), BreakoutError> {
        Self::emit(&render_analysis(report))
    }

    fn params(&self, params: &ModelParams) -> Result<(), BreakoutError> {
        Self::emit(&render_params(params))
    }

    fn history(&self, metrics: &[EvaluationMetric]) -> Result<(), BreakoutError> {
        Self::emit(&render_history(metrics))
    }
}

pub fn render_predictions(predictions: &[Prediction]) -> String {
    let mut out = String::new();
    let Some(first) = predictions.first() else {
        out.push_str("No candidates qualified.\n");
        return out;
    };

    let _ = writeln!(out, "=== Predictions for {} ===", first.target_date);
    let _ = writeln!(
        out,
        "{:<16} {:>6} {:>10} {:>10} {:>10} {:>8}",
        "Instrument", "Score", "Entry", "Target", "Stop", "ATR"
    );
    for p in predictions {
        let _ = writeln!(
            out,
            "{:<16} {:>6.2} {:>10.2} {:>10.2} {:>10.2} {:>8.2}",
            p.instrument,
            p.score,
            p.levels.entry,
            p.levels.target,
            p.levels.stop_loss,
            p.levels.volatility_unit
        );
    }
    out
}

pub fn render_analysis(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Analysis for {} ===", report.date);

    if report.predictions.is_empty() {
        out.push_str("No predictions were labeled.\n");
        return out;
    }

    for p in &report.predictions {
        let Some(outcome) = &p.outcome else { continue };
        let _ = writeln!(
            out,
            "{:<16} {:<14} entry {:.2} / high {:.2} / low {:.2}",
            p.instrument,
            outcome.label.as_str(),
            p.levels.entry,
            outcome.realized.high,
            outcome.realized.low
        );
        let _ = writeln!(out, "    {}", outcome.rationale);
    }

    if let Some(metric) = &report.metric {
        let _ = writeln!(
            out,
            "\nWin rate: {:.1}% ({} target / {} stop / {} no entry / {} stagnant)",
            metric.win_rate * 100.0,
            metric.counts.target_hit,
            metric.counts.stop_loss_hit,
            metric.counts.no_entry,
            metric.counts.stagnant
        );
    }

    if let Some(retrain) = &report.retrain {
        let _ = writeln!(
            out,
            "Retrained on {} samples: multiplier {}, ratio {} ({:.1}% simulated win rate)",
            retrain.samples,
            retrain.best.multiplier,
            retrain.best.ratio,
            retrain.best.win_rate() * 100.0
        );
    }
    out
}

pub fn render_params(params: &ModelParams) -> String {
    let mut out = String::new();
    for (name, value) in params.to_entries() {
        let _ = writeln!(out, "{:<24} {}", name, value);
    }
    out
}

pub fn render_history(metrics: &[EvaluationMetric]) -> String {
    let mut out = String::new();
    if metrics.is_empty() {
        out.push_str("No evaluation history.\n");
        return out;
    }
    let _ = writeln!(
        out,
        "{:<12} {:>6} {:>6} {:>6} {:>6} {:>6} {:>9} {:>9}",
        "Date", "Total", "Hit", "Stop", "NoEnt", "Stag", "WinRate", "Retrained"
    );
    for m in metrics {
        let _ = writeln!(
            out,
            "{:<12} {:>6} {:>6} {:>6} {:>6} {:>6} {:>8.1}% {:>9}",
            m.date.to_string(),
            m.total,
            m.counts.target_hit,
            m.counts.stop_loss_hit,
            m.counts.no_entry,
            m.counts.stagnant,
            m.win_rate * 100.0,
            if m.retrained { "yes" } else { "no" }
        );
    }
    out
}

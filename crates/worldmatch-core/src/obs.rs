//! Structured observability hooks for matching, extraction, and evaluation.
//!
//! - `EvalSpan` RAII guard tags everything logged during an evaluation run
//! - `emit_*` functions log one lifecycle event each, keyed by `event = "..."`

use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::AdoptionStatus;

/// RAII guard that enters an evaluation-scoped span.
///
/// ```ignore
/// let _span = EvalSpan::enter("results/gm_2026");
/// // every event below carries input_source = "results/gm_2026"
/// ```
pub struct EvalSpan {
    _span: tracing::span::EnteredSpan,
}

impl EvalSpan {
    pub fn enter(input_source: &str) -> Self {
        let span = tracing::info_span!("worldmatch.eval", input_source = %input_source);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: one match attempt finished.
pub fn emit_match_completed(
    query: &str,
    status: AdoptionStatus,
    candidates: usize,
    top_score: Option<f64>,
) {
    debug!(
        event = "match.completed",
        query = %query,
        status = %status,
        candidates = candidates,
        top_score = top_score,
    );
}

/// Emit event: a strategy proposed a name outside the world set and it was dropped.
pub fn emit_world_expansion_blocked(name: &str) {
    warn!(event = "match.world_expansion_blocked", name = %name);
}

/// Emit event: metrics computed for one grid threshold.
pub fn emit_threshold_evaluated(threshold: f64, recall: f64, precision: f64, fp_rate: f64) {
    info!(
        event = "eval.threshold_evaluated",
        threshold = threshold,
        recall = recall,
        precision = precision,
        fp_rate = fp_rate,
    );
}

/// Emit event: best threshold selected by F1.
pub fn emit_best_threshold(threshold: f64, f1: f64) {
    info!(event = "eval.best_threshold", threshold = threshold, f1 = f1);
}

/// Emit event: a run directory could not be read (warning level).
pub fn emit_run_extraction_failed(run_path: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "extract.run_failed", run_path = %run_path.display(), error = %error);
}

/// Emit event: extraction over a results directory finished.
pub fn emit_extraction_completed(runs: usize, samples: usize, failed_runs: usize) {
    info!(
        event = "extract.completed",
        runs = runs,
        samples = samples,
        failed_runs = failed_runs,
    );
}

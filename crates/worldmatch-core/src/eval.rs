//! Threshold-sweep evaluation of the fuzzy matcher.
//!
//! For each grid threshold a suggestion-only [`FuzzyMatcher`] is run over
//! every ground-truthed sample. Each match attempt is written to the audit
//! sink, and the per-threshold [`EvalMetrics`] are folded into an
//! [`EvalSummary`] that names the F1-best threshold.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditLogger, AuditSink};
use crate::domain::{
    EvalMetrics, EvalOutcome, EvalResult, EvalSummary, MissingObjectSample, Result, ScoredName,
    WorldmatchError,
};
use crate::matcher::fuzzy::FuzzyMatcher;
use crate::matcher::similarity::SimilarityBackend;
use crate::matcher::{Matcher, MatcherConfig, DEFAULT_MAX_CANDIDATES};
use crate::obs::{self, EvalSpan};

pub const DEFAULT_THRESHOLD_GRID: [f64; 5] = [0.70, 0.75, 0.80, 0.85, 0.90];

/// File name of the audit log written beside the reports.
pub const AUDIT_LOG_FILE: &str = "audit.jsonl";

/// Knobs for one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Suggestion thresholds, evaluated in this order.
    pub threshold_grid: Vec<f64>,
    pub backend: SimilarityBackend,
    pub max_candidates: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            threshold_grid: DEFAULT_THRESHOLD_GRID.to_vec(),
            backend: SimilarityBackend::detect(),
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl EvalConfig {
    /// The grid must be non-empty with every threshold in `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<()> {
        if self.threshold_grid.is_empty() {
            return Err(WorldmatchError::EmptyThresholdGrid);
        }
        if let Some(t) = self
            .threshold_grid
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(WorldmatchError::InvalidConfig(format!(
                "threshold_grid values must be within [0.0, 1.0], got {}",
                t
            )));
        }
        if self.max_candidates == 0 {
            return Err(WorldmatchError::InvalidConfig(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Suggestion-only matcher for one grid threshold.
    pub fn matcher_for(&self, threshold: f64) -> Result<FuzzyMatcher> {
        let config = MatcherConfig {
            max_candidates: self.max_candidates,
            ..MatcherConfig::suggest_only(threshold)
        };
        FuzzyMatcher::with_backend(config, self.backend)
    }
}

/// Run `matcher` on one sample and classify the outcome against its ground truth.
///
/// A suggestion on a sample without ground truth counts as a false positive.
pub fn evaluate_sample(
    sample: &MissingObjectSample,
    matcher: &dyn Matcher,
    threshold: f64,
    audit: Option<&mut dyn AuditSink>,
) -> Result<EvalResult> {
    let result = matcher.match_query(&sample.query, &sample.world_objects);

    let candidates: Vec<ScoredName> = result
        .candidates()
        .iter()
        .map(|c| ScoredName {
            name: c.name().to_string(),
            score: c.score(),
        })
        .collect();
    let top_candidate = candidates.first().map(|c| c.name.clone());
    let top_score = candidates.first().map_or(0.0, |c| c.score);
    let has_suggestion = !candidates.is_empty() && top_score >= threshold;

    let (outcome, gt_in_candidates) = match &sample.ground_truth {
        Some(gt) => {
            let outcome = if !has_suggestion {
                EvalOutcome::NoMatch
            } else if top_candidate.as_ref() == Some(gt) {
                EvalOutcome::TruePositive
            } else {
                EvalOutcome::FalsePositive
            };
            (outcome, candidates.iter().any(|c| &c.name == gt))
        }
        None if has_suggestion => (EvalOutcome::FalsePositive, false),
        None => (EvalOutcome::NoMatch, false),
    };

    if let Some(sink) = audit {
        sink.log_match_result(&result, &sample.world_objects)?;
    }

    Ok(EvalResult {
        sample_id: sample.sample_id.clone(),
        query: sample.query.clone(),
        ground_truth: sample.ground_truth.clone(),
        candidates,
        top_candidate,
        top_score,
        outcome,
        gt_in_candidates,
        threshold_used: threshold,
    })
}

/// Evaluate every ground-truthed sample at `threshold`.
///
/// Returns the results and the number of samples skipped for lack of ground truth.
pub fn evaluate_samples_at_threshold(
    samples: &[MissingObjectSample],
    threshold: f64,
    config: &EvalConfig,
    mut audit: Option<&mut dyn AuditSink>,
) -> Result<(Vec<EvalResult>, usize)> {
    let matcher = config.matcher_for(threshold)?;

    let mut results = Vec::new();
    let mut excluded = 0;
    for sample in samples {
        if !sample.has_ground_truth() {
            excluded += 1;
            continue;
        }
        results.push(evaluate_sample(sample, &matcher, threshold, reborrow(&mut audit))?);
    }
    Ok((results, excluded))
}

/// Sweep the grid, recording every match attempt in `audit`.
pub fn run_evaluation_with_sink(
    samples: &[MissingObjectSample],
    config: &EvalConfig,
    mut audit: Option<&mut dyn AuditSink>,
    input_source: &str,
) -> Result<EvalSummary> {
    config.validate()?;
    let _span = EvalSpan::enter(input_source);

    let mut metrics = Vec::with_capacity(config.threshold_grid.len());
    for &threshold in &config.threshold_grid {
        let (results, excluded) =
            evaluate_samples_at_threshold(samples, threshold, config, reborrow(&mut audit))?;
        let m = EvalMetrics::compute(&results, excluded, threshold);
        obs::emit_threshold_evaluated(threshold, m.recall, m.precision, m.fp_rate);
        metrics.push(m);
    }

    let summary = EvalSummary::find_best(metrics, input_source)?;
    obs::emit_best_threshold(summary.best_threshold, summary.best_f1());
    Ok(summary)
}

/// Shorten the sink's object lifetime so it can be lent out once per loop iteration.
fn reborrow<'a>(audit: &'a mut Option<&mut dyn AuditSink>) -> Option<&'a mut dyn AuditSink> {
    audit.as_mut().map(|sink| &mut **sink as &mut dyn AuditSink)
}

/// Sweep the grid. With `output_dir`, match attempts are appended to
/// `<output_dir>/audit.jsonl`.
pub fn run_evaluation(
    samples: &[MissingObjectSample],
    config: &EvalConfig,
    output_dir: Option<&Path>,
    input_source: &str,
) -> Result<EvalSummary> {
    let mut logger = match output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            Some(AuditLogger::open(dir.join(AUDIT_LOG_FILE))?)
        }
        None => None,
    };
    run_evaluation_with_sink(
        samples,
        config,
        logger.as_mut().map(|l| l as &mut dyn AuditSink),
        input_source,
    )
}

/// Interactive single-query check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEvaluation {
    /// Top candidate when it clears the threshold.
    pub top_match: Option<String>,
    /// Score of `top_match`, 0.0 when there is none.
    pub score: f64,
    pub candidates: Vec<ScoredName>,
}

pub fn evaluate_single_query(
    query: &str,
    world_objects: &BTreeSet<String>,
    threshold: f64,
    backend: SimilarityBackend,
) -> Result<QueryEvaluation> {
    let matcher = FuzzyMatcher::with_backend(MatcherConfig::suggest_only(threshold), backend)?;
    let result = matcher.match_query(query, world_objects);
    let candidates: Vec<ScoredName> = result
        .candidates()
        .iter()
        .map(|c| ScoredName {
            name: c.name().to_string(),
            score: c.score(),
        })
        .collect();

    let (top_match, score) = match candidates.first() {
        Some(top) if top.score >= threshold => (Some(top.name.clone()), top.score),
        _ => (None, 0.0),
    };
    Ok(QueryEvaluation {
        top_match,
        score,
        candidates,
    })
}

//! Evaluation outcomes, per-threshold metrics, and grid summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, WorldmatchError};

/// Classification of one sample at one threshold. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalOutcome {
    /// Top candidate equals the ground truth.
    TruePositive,
    /// Top candidate exists but differs from the ground truth (or there is none).
    FalsePositive,
    /// No candidate cleared the threshold.
    NoMatch,
}

/// Name and score of a candidate as seen by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredName {
    pub name: String,
    pub score: f64,
}

/// Result of evaluating one sample with the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub sample_id: String,
    pub query: String,
    pub ground_truth: Option<String>,
    pub candidates: Vec<ScoredName>,
    pub top_candidate: Option<String>,
    /// 0.0 when there are no candidates.
    pub top_score: f64,
    pub outcome: EvalOutcome,
    /// Ground truth appears anywhere in `candidates`.
    pub gt_in_candidates: bool,
    pub threshold_used: f64,
}

impl EvalResult {
    pub fn is_true_positive(&self) -> bool {
        self.outcome == EvalOutcome::TruePositive
    }

    pub fn is_false_positive(&self) -> bool {
        self.outcome == EvalOutcome::FalsePositive
    }

    pub fn is_no_match(&self) -> bool {
        self.outcome == EvalOutcome::NoMatch
    }
}

/// Aggregate metrics for one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub total_samples: usize,
    pub excluded_samples: usize,
    /// `excluded / (total + excluded)`.
    pub exclusion_rate: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub no_matches: usize,
    /// `TP / total` (rescue rate).
    pub recall: f64,
    /// `TP / (TP + FP)`, 0 when nothing was suggested.
    pub precision: f64,
    /// `FP / total`.
    pub fp_rate: f64,
    pub threshold: f64,
}

impl EvalMetrics {
    /// Aggregate per-sample results.
    pub fn compute(results: &[EvalResult], excluded_count: usize, threshold: f64) -> Self {
        let total = results.len();
        if total == 0 {
            return Self {
                total_samples: 0,
                excluded_samples: excluded_count,
                exclusion_rate: if excluded_count > 0 { 1.0 } else { 0.0 },
                true_positives: 0,
                false_positives: 0,
                no_matches: 0,
                recall: 0.0,
                precision: 0.0,
                fp_rate: 0.0,
                threshold,
            };
        }

        let tp = results.iter().filter(|r| r.is_true_positive()).count();
        let fp = results.iter().filter(|r| r.is_false_positive()).count();
        let no_match = results.iter().filter(|r| r.is_no_match()).count();

        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };

        Self {
            total_samples: total,
            excluded_samples: excluded_count,
            exclusion_rate: excluded_count as f64 / (total + excluded_count) as f64,
            true_positives: tp,
            false_positives: fp,
            no_matches: no_match,
            recall: tp as f64 / total as f64,
            precision,
            fp_rate: fp as f64 / total as f64,
            threshold,
        }
    }

    /// Harmonic mean of precision and recall; 0 when both are 0.
    pub fn f1(&self) -> f64 {
        let sum = self.precision + self.recall;
        if sum > 0.0 {
            2.0 * self.precision * self.recall / sum
        } else {
            0.0
        }
    }
}

/// Metrics for a whole threshold grid plus the F1-best threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub generated_at: DateTime<Utc>,
    pub input_source: String,
    /// Thresholds in evaluation order.
    pub threshold_grid: Vec<f64>,
    /// One entry per grid threshold, same order.
    pub metrics: Vec<EvalMetrics>,
    pub best_threshold: f64,
    pub best_metrics: EvalMetrics,
}

impl EvalSummary {
    /// Pick the threshold with the highest F1. Ties keep the earliest entry.
    pub fn find_best(metrics: Vec<EvalMetrics>, input_source: impl Into<String>) -> Result<Self> {
        let mut best: Option<&EvalMetrics> = None;
        for m in &metrics {
            match best {
                Some(b) if m.f1() <= b.f1() => {}
                _ => best = Some(m),
            }
        }
        let best_metrics = best.cloned().ok_or(WorldmatchError::EmptyThresholdGrid)?;

        Ok(Self {
            generated_at: Utc::now(),
            input_source: input_source.into(),
            threshold_grid: metrics.iter().map(|m| m.threshold).collect(),
            best_threshold: best_metrics.threshold,
            best_metrics,
            metrics,
        })
    }

    /// Metrics for the given grid threshold.
    pub fn metrics_for(&self, threshold: f64) -> Option<&EvalMetrics> {
        self.metrics.iter().find(|m| m.threshold == threshold)
    }

    pub fn best_f1(&self) -> f64 {
        self.best_metrics.f1()
    }
}

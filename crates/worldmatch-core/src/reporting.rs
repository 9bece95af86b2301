use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::{EvalMetrics, EvalSummary, MissingObjectSample};

pub const SCHEMA_VERSION: &str = "1.0";

pub const SUMMARY_JSON_FILE: &str = "summary.json";
pub const SUMMARY_MD_FILE: &str = "summary.md";
pub const SAMPLES_JSON_FILE: &str = "samples.json";
pub const UNGROUNDED_SAMPLES_JSON_FILE: &str = "samples_no_gt.json";

/// Caps applied to samples_no_gt.json.
pub const MAX_UNGROUNDED_SAMPLES: usize = 50;
pub const MAX_WORLD_OBJECTS_PER_SAMPLE: usize = 10;

/// Which summary artifacts to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
    #[default]
    Both,
}

impl ReportFormat {
    pub fn includes_json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    pub fn includes_markdown(self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Both => "both",
        })
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown report format '{}' (expected json, markdown or both)",
                other
            )),
        }
    }
}

/// Per-threshold metrics as persisted in summary.json. Rates are rounded to 4 decimals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsArtifact {
    pub total_samples: usize,
    pub excluded_samples: usize,
    pub exclusion_rate: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub no_matches: usize,
    pub recall: f64,
    pub precision: f64,
    pub fp_rate: f64,
    pub f1: f64,
    pub threshold: f64,
}

impl From<&EvalMetrics> for MetricsArtifact {
    fn from(m: &EvalMetrics) -> Self {
        Self {
            total_samples: m.total_samples,
            excluded_samples: m.excluded_samples,
            exclusion_rate: round4(m.exclusion_rate),
            true_positives: m.true_positives,
            false_positives: m.false_positives,
            no_matches: m.no_matches,
            recall: round4(m.recall),
            precision: round4(m.precision),
            fp_rate: round4(m.fp_rate),
            f1: round4(m.f1()),
            threshold: m.threshold,
        }
    }
}

/// Canonical evaluation summary artifact (summary.json).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub input_source: String,
    pub threshold_grid: Vec<f64>,
    /// Keyed by the threshold as written in the grid, e.g. `"0.75"`.
    pub metrics_by_threshold: BTreeMap<String, MetricsArtifact>,
    pub best_threshold: f64,
    pub best_f1: f64,
    pub best_metrics: MetricsArtifact,
}

impl From<&EvalSummary> for SummaryArtifact {
    fn from(summary: &EvalSummary) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: summary.generated_at,
            input_source: summary.input_source.clone(),
            threshold_grid: summary.threshold_grid.clone(),
            metrics_by_threshold: summary
                .metrics
                .iter()
                .map(|m| (threshold_key(m.threshold), MetricsArtifact::from(m)))
                .collect(),
            best_threshold: summary.best_threshold,
            best_f1: round4(summary.best_f1()),
            best_metrics: MetricsArtifact::from(&summary.best_metrics),
        }
    }
}

/// Ground-truthed sample as listed in samples.json.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleDetail {
    pub sample_id: String,
    pub query: String,
    pub ground_truth: Option<String>,
    pub scenario: String,
    pub session_id: String,
    pub turn_number: u32,
    pub speaker: String,
    pub denied_reason: Option<String>,
}

impl From<&MissingObjectSample> for SampleDetail {
    fn from(s: &MissingObjectSample) -> Self {
        Self {
            sample_id: s.sample_id.clone(),
            query: s.query.clone(),
            ground_truth: s.ground_truth.clone(),
            scenario: s.scenario.clone(),
            session_id: s.session_id.clone(),
            turn_number: s.turn_number,
            speaker: s.speaker.clone(),
            denied_reason: s.denied_reason.clone(),
        }
    }
}

/// Sample without ground truth, listed in samples_no_gt.json for manual triage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UngroundedSample {
    pub sample_id: String,
    pub query: String,
    pub scenario: String,
    pub session_id: String,
    pub turn_number: u32,
    pub denied_reason: Option<String>,
    /// First few world objects only.
    pub world_objects: Vec<String>,
}

impl From<&MissingObjectSample> for UngroundedSample {
    fn from(s: &MissingObjectSample) -> Self {
        Self {
            sample_id: s.sample_id.clone(),
            query: s.query.clone(),
            scenario: s.scenario.clone(),
            session_id: s.session_id.clone(),
            turn_number: s.turn_number,
            denied_reason: s.denied_reason.clone(),
            world_objects: s
                .world_objects
                .iter()
                .take(MAX_WORLD_OBJECTS_PER_SAMPLE)
                .cloned()
                .collect(),
        }
    }
}

/// Write summary.json in pretty JSON format.
pub fn write_summary_json(path: &Path, summary: &EvalSummary) -> Result<()> {
    let artifact = SummaryArtifact::from(summary);
    let content = serde_json::to_string_pretty(&artifact).context("serialize summary artifact")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the human-readable evaluation report.
pub fn render_summary_md(summary: &EvalSummary) -> String {
    let best = &summary.best_metrics;
    let mut out = String::new();
    out.push_str("# Fuzzy Matcher Evaluation Report\n\n");
    out.push_str(&format!(
        "**Generated**: {}\n**Input Source**: {}\n\n",
        summary.generated_at.to_rfc3339(),
        summary.input_source
    ));

    out.push_str("## Summary\n\n");
    out.push_str(&format!(
        "- **Best Threshold**: {}\n- **Best Recall**: {}\n- **Best Precision**: {}\n- **Best FP Rate**: {}\n- **Best F1**: {:.4}\n\n",
        summary.best_threshold,
        pct(best.recall),
        pct(best.precision),
        pct(best.fp_rate),
        summary.best_f1()
    ));

    out.push_str("## Threshold Grid Comparison\n\n");
    out.push_str("| Threshold | Recall | Precision | FP Rate | TP | FP | NoMatch | Samples |\n");
    out.push_str("|-----------|--------|-----------|---------|----|----|---------|---------|\n");
    for m in &summary.metrics {
        let threshold = if m.threshold == summary.best_threshold {
            format!("**{}**", m.threshold)
        } else {
            m.threshold.to_string()
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
            threshold,
            pct(m.recall),
            pct(m.precision),
            pct(m.fp_rate),
            m.true_positives,
            m.false_positives,
            m.no_matches,
            m.total_samples
        ));
    }
    out.push('\n');

    out.push_str("## Data Quality\n\n");
    out.push_str(
        "Ground truth is a heuristic pseudo-label inferred from the run logs, not a verified answer.\n\n",
    );
    out.push_str(&format!(
        "- **Total Samples (with GT)**: {}\n- **Excluded Samples (no GT)**: {}\n- **Exclusion Rate**: {}\n\n",
        best.total_samples,
        best.excluded_samples,
        pct(best.exclusion_rate)
    ));

    out.push_str("## Interpretation\n\n");
    out.push_str("- **Recall** = TP / Total Samples (how many missing-object incidents could be rescued)\n");
    out.push_str("- **Precision** = TP / (TP + FP) (how accurate the suggestions are)\n");
    out.push_str("- **FP Rate** = FP / Total Samples (how often a wrong object is suggested)\n\n");
    out.push_str("---\n\n");
    out.push_str("*Auto-adopt is DISABLED. All matches are suggestions only.*\n");
    out
}

/// Write summary.md.
pub fn write_summary_md(path: &Path, summary: &EvalSummary) -> Result<()> {
    let md = render_summary_md(summary);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write samples.json listing the ground-truthed samples.
pub fn write_samples_json(path: &Path, samples: &[MissingObjectSample]) -> Result<()> {
    let details: Vec<SampleDetail> = samples.iter().map(SampleDetail::from).collect();
    let content = serde_json::to_string_pretty(&details).context("serialize sample details")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write samples_no_gt.json with at most [`MAX_UNGROUNDED_SAMPLES`] entries.
pub fn write_ungrounded_samples_json(path: &Path, samples: &[MissingObjectSample]) -> Result<()> {
    let listed: Vec<UngroundedSample> = samples
        .iter()
        .take(MAX_UNGROUNDED_SAMPLES)
        .map(UngroundedSample::from)
        .collect();
    let content = serde_json::to_string_pretty(&listed).context("serialize ungrounded samples")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write the summary artifacts selected by `format` into `output_dir`.
pub fn write_eval_reports(
    output_dir: &Path,
    summary: &EvalSummary,
    format: ReportFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {:?}", output_dir))?;

    let mut written = Vec::new();
    if format.includes_json() {
        let path = output_dir.join(SUMMARY_JSON_FILE);
        write_summary_json(&path, summary)?;
        written.push(path);
    }
    if format.includes_markdown() {
        let path = output_dir.join(SUMMARY_MD_FILE);
        write_summary_md(&path, summary)?;
        written.push(path);
    }
    Ok(written)
}

/// Threshold as a map key; always carries a fractional part (`1` -> `"1.0"`).
pub fn threshold_key(threshold: f64) -> String {
    let key = threshold.to_string();
    if key.contains('.') {
        key
    } else {
        format!("{}.0", key)
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvalOutcome, EvalResult};
    use serde_json::json;

    fn metrics(threshold: f64, tp: usize, fp: usize, no_match: usize, excluded: usize) -> EvalMetrics {
        let result = |outcome| EvalResult {
            sample_id: "s".to_string(),
            query: "q".to_string(),
            ground_truth: Some("gt".to_string()),
            candidates: vec![],
            top_candidate: None,
            top_score: 0.0,
            outcome,
            gt_in_candidates: false,
            threshold_used: threshold,
        };
        let mut results = Vec::new();
        results.extend((0..tp).map(|_| result(EvalOutcome::TruePositive)));
        results.extend((0..fp).map(|_| result(EvalOutcome::FalsePositive)));
        results.extend((0..no_match).map(|_| result(EvalOutcome::NoMatch)));
        EvalMetrics::compute(&results, excluded, threshold)
    }

    fn summary() -> EvalSummary {
        let mut s = EvalSummary::find_best(
            vec![
                metrics(0.7, 6, 3, 0, 1),
                metrics(0.8, 6, 1, 2, 1),
                metrics(0.9, 2, 0, 7, 1),
            ],
            "results/gm_*",
        )
        .expect("non-empty grid");
        s.generated_at = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("parse RFC3339")
            .with_timezone(&Utc);
        s
    }

    #[test]
    fn summary_json_schema_has_expected_keys() {
        let raw = serde_json::to_value(SummaryArtifact::from(&summary())).expect("serialize");
        let obj = raw.as_object().expect("artifact object");
        for key in [
            "schema_version",
            "generated_at",
            "input_source",
            "threshold_grid",
            "metrics_by_threshold",
            "best_threshold",
            "best_f1",
            "best_metrics",
        ] {
            assert!(obj.contains_key(key), "missing key: {}", key);
        }
        assert_eq!(raw["best_threshold"], json!(0.8));
        assert_eq!(raw["metrics_by_threshold"]["0.8"]["true_positives"], json!(6));
        // 6 / 9
        assert_eq!(raw["metrics_by_threshold"]["0.8"]["recall"], json!(0.6667));
        assert_eq!(raw["generated_at"], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn threshold_keys_keep_fraction() {
        assert_eq!(threshold_key(0.75), "0.75");
        assert_eq!(threshold_key(1.0), "1.0");
        assert_eq!(threshold_key(0.0), "0.0");
    }

    #[test]
    fn summary_markdown_marks_best_row() {
        let md = render_summary_md(&summary());
        assert!(md.starts_with("# Fuzzy Matcher Evaluation Report\n"));
        assert!(md.contains("| **0.8** | 66.7% | 85.7% | 11.1% | 6 | 1 | 2 | 9 |"));
        assert!(md.contains("| 0.7 | 66.7% | 66.7% | 33.3% | 6 | 3 | 0 | 9 |"));
        assert!(md.contains("## Data Quality"));
        assert!(md.contains("- **Exclusion Rate**: 10.0%"));
        assert!(md.contains("pseudo-label"));
        assert!(md.trim_end().ends_with("*Auto-adopt is DISABLED. All matches are suggestions only.*"));
    }

    #[test]
    fn report_format_parsing() {
        assert_eq!("json".parse::<ReportFormat>(), Ok(ReportFormat::Json));
        assert_eq!("Markdown".parse::<ReportFormat>(), Ok(ReportFormat::Markdown));
        assert_eq!("both".parse::<ReportFormat>(), Ok(ReportFormat::Both));
        assert!("html".parse::<ReportFormat>().is_err());
        assert!(!ReportFormat::Json.includes_markdown());
        assert!(ReportFormat::Both.includes_json());
    }

    #[test]
    fn write_reports_respects_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let written =
            write_eval_reports(dir.path(), &summary(), ReportFormat::Markdown).expect("write");
        assert_eq!(written, vec![dir.path().join(SUMMARY_MD_FILE)]);
        assert!(!dir.path().join(SUMMARY_JSON_FILE).exists());

        let written = write_eval_reports(dir.path(), &summary(), ReportFormat::Both).expect("write");
        assert_eq!(written.len(), 2);
        let raw = std::fs::read_to_string(dir.path().join(SUMMARY_JSON_FILE)).expect("read");
        let parsed: SummaryArtifact = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn ungrounded_samples_are_capped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let world: std::collections::BTreeSet<String> =
            (0..15).map(|i| format!("obj{:02}", i)).collect();
        let samples: Vec<MissingObjectSample> = (0..60)
            .map(|i| MissingObjectSample {
                sample_id: format!("s_t{}_invented_x", i),
                run_path: PathBuf::from("results/gm_1"),
                session_id: "s".to_string(),
                turn_number: i,
                query: "x".to_string(),
                world_objects: world.clone(),
                scenario: "unknown".to_string(),
                speaker: String::new(),
                denied_reason: None,
                ground_truth: None,
            })
            .collect();

        let path = dir.path().join(UNGROUNDED_SAMPLES_JSON_FILE);
        write_ungrounded_samples_json(&path, &samples).expect("write");
        let raw = std::fs::read_to_string(&path).expect("read");
        let listed: Vec<UngroundedSample> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(listed.len(), MAX_UNGROUNDED_SAMPLES);
        assert_eq!(listed[0].world_objects.len(), MAX_WORLD_OBJECTS_PER_SAMPLE);
        assert_eq!(listed[0].world_objects[0], "obj00");
    }
}

//! worldmatch core library
//!
//! Resolves "missing object" references against a closed set of world
//! objects by suggesting the closest existing name, and measures how well
//! that works on incidents mined from historical runs. A returned candidate
//! is always a member of the world set it was matched against.

pub mod audit;
pub mod config;
pub mod domain;
pub mod eval;
pub mod extract;
pub mod matcher;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod telemetry;

pub use domain::{
    is_generic_noun, AdoptionStatus, AuditLogEntry, Candidate, CandidateRecord, EvalMetrics,
    EvalOutcome, EvalResult, EvalSummary, MatchMethod, MatchResult, MissingObjectSample,
    RejectionReason, Result, ScoredName, WorldmatchError, GENERIC_NOUNS,
};

pub use matcher::fuzzy::FuzzyMatcher;
pub use matcher::preprocess::{
    expand_queries, extract_action_object, extract_x_no_y_pattern, normalize_query,
    suggest_match,
};
pub use matcher::similarity::{indel_ratio, SimilarityBackend};
pub use matcher::{Matcher, MatcherConfig, DEFAULT_MAX_CANDIDATES};

pub use audit::{
    load_audit_log, summarize_audit_log, AuditLogger, AuditSink, AuditSummary,
    InMemoryAuditLogger,
};
pub use extract::{
    deduplicate_samples, extract_samples_from_results_dir, extract_samples_from_run,
    extract_world_objects, infer_ground_truth, partition_by_ground_truth, ExtractionReport,
    FailedRun, TurnRecord,
};
pub use eval::{
    evaluate_sample, evaluate_samples_at_threshold, evaluate_single_query, run_evaluation,
    run_evaluation_with_sink, EvalConfig, QueryEvaluation, AUDIT_LOG_FILE,
    DEFAULT_THRESHOLD_GRID,
};
pub use reporting::{
    render_summary_md, write_eval_reports, write_samples_json, write_summary_json,
    write_summary_md, write_ungrounded_samples_json, ReportFormat, SampleDetail,
    SummaryArtifact, UngroundedSample,
};
pub use config::WorldmatchConfig;

pub use metrics::{MetricsSnapshot, METRICS};
pub use obs::EvalSpan;
pub use telemetry::init_tracing;

/// worldmatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

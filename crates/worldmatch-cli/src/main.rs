//! worldmatch CLI
//!
//! The `worldmatch` command resolves missing-object references against a
//! closed world and measures how well that works on historical runs.
//!
//! ## Commands
//!
//! - `eval`: sweep a threshold grid over mined samples and write reports
//! - `match`: resolve one query against a world
//! - `extract`: mine missing-object samples without evaluating them
//! - `audit`: replay an audit log and print per-status counts

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn, Level};

use worldmatch_core::reporting::{SAMPLES_JSON_FILE, UNGROUNDED_SAMPLES_JSON_FILE};
use worldmatch_core::{
    deduplicate_samples, extract_samples_from_results_dir, extract_samples_from_run,
    extract_world_objects, load_audit_log, partition_by_ground_truth, run_evaluation,
    suggest_match, summarize_audit_log, write_eval_reports, write_samples_json,
    write_ungrounded_samples_json, AuditLogger, AuditSink, EvalSummary, FuzzyMatcher, Matcher,
    MissingObjectSample, ReportFormat, SimilarityBackend, WorldmatchConfig, AUDIT_LOG_FILE,
    METRICS,
};

#[derive(Parser)]
#[command(name = "worldmatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Constrained fuzzy matching of missing objects against a closed world", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file (default: ./worldmatch.toml when present)
    #[arg(long, global = true, env = "WORLDMATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where samples come from: one run directory, or a sweep of a results directory.
#[derive(clap::Args, Debug, Clone, Default)]
struct SourceArgs {
    /// Single run directory
    #[arg(long, conflicts_with_all = ["results_dir", "pattern"])]
    run: Option<PathBuf>,

    /// Directory holding run directories (default from config: results)
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Glob for run directory names (default from config: gm_*)
    #[arg(long)]
    pattern: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the fuzzy matcher over a threshold grid
    Eval {
        #[command(flatten)]
        source: SourceArgs,

        /// Comma-separated threshold grid, e.g. 0.7,0.8,0.9
        #[arg(long, value_delimiter = ',')]
        thresholds: Option<Vec<f64>>,

        /// Output directory (default: results/semantic_eval_<timestamp>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format: json, markdown or both
        #[arg(long)]
        format: Option<ReportFormat>,

        /// Similarity backend: auto, levenshtein or indel
        #[arg(long)]
        backend: Option<SimilarityBackend>,
    },

    /// Match one query against a world
    Match {
        /// Object name to resolve
        query: String,

        /// Comma-separated world objects
        #[arg(long, value_delimiter = ',')]
        world: Vec<String>,

        /// world_canonical.json whose props keys are added to the world
        #[arg(long)]
        world_file: Option<PathBuf>,

        /// Suggestion threshold
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Allow adoption without confirmation above the auto-adopt threshold
        #[arg(long, conflicts_with = "expand")]
        allow_auto_adopt: bool,

        /// Try query expansions (X of Y, action objects) and return the best suggestion.
        /// Expansions never adopt and are not audited.
        #[arg(long)]
        expand: bool,

        /// Append the match to this JSONL audit log (not with --expand)
        #[arg(long, conflicts_with = "expand")]
        audit_log: Option<PathBuf>,

        /// Similarity backend: auto, levenshtein or indel
        #[arg(long)]
        backend: Option<SimilarityBackend>,
    },

    /// Extract missing-object samples from run logs
    Extract {
        #[command(flatten)]
        source: SourceArgs,

        /// Write all extracted samples to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay an audit log and print per-status counts
    Audit {
        /// JSONL audit log
        path: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    worldmatch_core::init_tracing(cli.json, level);

    let config = WorldmatchConfig::load(cli.config.as_deref())
        .context("Failed to load worldmatch configuration")?;

    let code = match cli.command {
        Commands::Eval {
            source,
            thresholds,
            output,
            format,
            backend,
        } => cmd_eval(
            &config,
            &source,
            thresholds,
            output.as_deref(),
            format,
            backend,
        )?,
        Commands::Match {
            query,
            world,
            world_file,
            threshold,
            allow_auto_adopt,
            expand,
            audit_log,
            backend,
        } => {
            let opts = MatchOptions {
                world,
                world_file,
                threshold,
                allow_auto_adopt,
                expand,
                audit_log,
                backend,
            };
            let output = cmd_match(&config, &query, &opts)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            ExitCode::SUCCESS
        }
        Commands::Extract { source, output } => {
            cmd_extract(&config, &source, output.as_deref())?;
            ExitCode::SUCCESS
        }
        Commands::Audit { path } => {
            cmd_audit(&path)?;
            ExitCode::SUCCESS
        }
    };

    METRICS.flush();
    Ok(code)
}

/// Samples from the selected source plus a label for reports.
struct LoadedSamples {
    input_source: String,
    samples: Vec<MissingObjectSample>,
    runs: usize,
    failed_runs: usize,
}

fn load_samples(config: &WorldmatchConfig, source: &SourceArgs) -> Result<LoadedSamples> {
    if let Some(run) = &source.run {
        let samples = extract_samples_from_run(run, None)
            .with_context(|| format!("Failed to extract samples from {:?}", run))?;
        return Ok(LoadedSamples {
            input_source: run.display().to_string(),
            samples: deduplicate_samples(samples),
            runs: 1,
            failed_runs: 0,
        });
    }

    let results_dir = source
        .results_dir
        .clone()
        .unwrap_or_else(|| config.eval.results_dir.clone());
    let pattern = source
        .pattern
        .clone()
        .unwrap_or_else(|| config.eval.pattern.clone());

    let report = extract_samples_from_results_dir(&results_dir, &pattern)
        .with_context(|| format!("Failed to scan {:?}", results_dir))?;
    for failed in &report.failed_runs {
        warn!(run_path = %failed.run_path.display(), error = %failed.error, "run skipped");
    }

    Ok(LoadedSamples {
        input_source: format!("{}/{}", results_dir.display(), pattern),
        runs: report.runs.len(),
        failed_runs: report.failed_runs.len(),
        samples: deduplicate_samples(report.samples),
    })
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results").join(format!(
        "semantic_eval_{}",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn cmd_eval(
    config: &WorldmatchConfig,
    source: &SourceArgs,
    thresholds: Option<Vec<f64>>,
    output: Option<&Path>,
    format: Option<ReportFormat>,
    backend: Option<SimilarityBackend>,
) -> Result<ExitCode> {
    let mut eval_config = config.eval_config()?;
    if let Some(grid) = thresholds {
        eval_config.threshold_grid = grid;
    }
    if let Some(backend) = backend {
        eval_config.backend = backend;
    }
    eval_config
        .validate()
        .context("invalid threshold grid or backend settings")?;
    let format = format.unwrap_or(config.eval.format);
    let output_dir = output.map(Path::to_path_buf).unwrap_or_else(default_output_dir);

    let loaded = load_samples(config, source)?;
    info!(
        input_source = %loaded.input_source,
        runs = loaded.runs,
        failed_runs = loaded.failed_runs,
        samples = loaded.samples.len(),
        "samples loaded"
    );

    let (with_gt, without_gt) = partition_by_ground_truth(loaded.samples.clone());
    println!(
        "Samples: {} total, {} with ground truth, {} without",
        loaded.samples.len(),
        with_gt.len(),
        without_gt.len()
    );

    if with_gt.is_empty() {
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output dir {:?}", output_dir))?;
        let path = output_dir.join(UNGROUNDED_SAMPLES_JSON_FILE);
        write_ungrounded_samples_json(&path, &without_gt)?;
        eprintln!(
            "No samples with ground truth; nothing to evaluate. Ungrounded samples written to {:?}",
            path
        );
        return Ok(ExitCode::from(1));
    }

    let summary = run_evaluation(
        &loaded.samples,
        &eval_config,
        Some(&output_dir),
        &loaded.input_source,
    )
    .context("Evaluation failed")?;

    let mut written = write_eval_reports(&output_dir, &summary, format)?;
    let samples_path = output_dir.join(SAMPLES_JSON_FILE);
    write_samples_json(&samples_path, &with_gt)?;
    written.push(samples_path);
    if !without_gt.is_empty() {
        let path = output_dir.join(UNGROUNDED_SAMPLES_JSON_FILE);
        write_ungrounded_samples_json(&path, &without_gt)?;
        written.push(path);
    }
    written.push(output_dir.join(AUDIT_LOG_FILE));

    println!("{}", render_grid_table(&summary));
    for path in &written {
        println!("Wrote {:?}", path);
    }
    Ok(ExitCode::SUCCESS)
}

/// Plain-text grid table; the best threshold is marked with `*`.
fn render_grid_table(summary: &EvalSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>10}  {:>7}  {:>9}  {:>7}  {:>4}  {:>4}  {:>7}\n",
        "threshold", "recall", "precision", "fp_rate", "tp", "fp", "nomatch"
    ));
    for m in &summary.metrics {
        let marker = if m.threshold == summary.best_threshold {
            "*"
        } else {
            " "
        };
        out.push_str(&format!(
            "{}{:>9}  {:>6.1}%  {:>8.1}%  {:>6.1}%  {:>4}  {:>4}  {:>7}\n",
            marker,
            m.threshold,
            m.recall * 100.0,
            m.precision * 100.0,
            m.fp_rate * 100.0,
            m.true_positives,
            m.false_positives,
            m.no_matches
        ));
    }
    out.push_str(&format!(
        "\nBest threshold: {} (F1 {:.4})",
        summary.best_threshold,
        summary.best_f1()
    ));
    out
}

struct MatchOptions {
    world: Vec<String>,
    world_file: Option<PathBuf>,
    threshold: Option<f64>,
    allow_auto_adopt: bool,
    expand: bool,
    audit_log: Option<PathBuf>,
    backend: Option<SimilarityBackend>,
}

/// Output of `match`, printed as JSON.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MatchOutput {
    Result(worldmatch_core::MatchResult),
    Suggestion {
        query: String,
        suggestion: Option<String>,
        score: Option<f64>,
    },
}

fn resolve_world(names: &[String], world_file: Option<&Path>) -> Result<BTreeSet<String>> {
    let mut world: BTreeSet<String> = names
        .iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if let Some(path) = world_file {
        let objects = extract_world_objects(path)
            .with_context(|| format!("Failed to read world file {:?}", path))?;
        world.extend(objects);
    }
    Ok(world)
}

fn cmd_match(config: &WorldmatchConfig, query: &str, opts: &MatchOptions) -> Result<MatchOutput> {
    let world = resolve_world(&opts.world, opts.world_file.as_deref())?;
    let backend = match opts.backend {
        Some(backend) => backend,
        None => config.backend()?,
    };

    let mut matcher_config = config.matcher_config();
    if let Some(t) = opts.threshold {
        matcher_config.suggest_threshold = t;
        matcher_config.auto_adopt_threshold = matcher_config.auto_adopt_threshold.max(t);
    }
    matcher_config.allow_auto_adopt |= opts.allow_auto_adopt;

    if opts.expand {
        let best = suggest_match(
            query,
            &world,
            matcher_config.suggest_threshold,
            true,
            backend,
        )?;
        let (suggestion, score) = match best {
            Some((name, score)) => (Some(name), Some(score)),
            None => (None, None),
        };
        return Ok(MatchOutput::Suggestion {
            query: query.to_string(),
            suggestion,
            score,
        });
    }

    let matcher = FuzzyMatcher::with_backend(matcher_config, backend)?;
    let result = matcher.match_query(query, &world);

    if let Some(path) = &opts.audit_log {
        let mut logger = AuditLogger::open(path)
            .with_context(|| format!("Failed to open audit log {:?}", path))?;
        logger.log_match_result(&result, &world)?;
    }
    Ok(MatchOutput::Result(result))
}

fn cmd_extract(
    config: &WorldmatchConfig,
    source: &SourceArgs,
    output: Option<&Path>,
) -> Result<()> {
    let loaded = load_samples(config, source)?;
    let grounded = loaded
        .samples
        .iter()
        .filter(|s| s.has_ground_truth())
        .count();

    println!("Source: {}", loaded.input_source);
    println!("Runs: {} ({} failed)", loaded.runs, loaded.failed_runs);
    println!(
        "Samples: {} ({} with ground truth, {} without)",
        loaded.samples.len(),
        grounded,
        loaded.samples.len() - grounded
    );

    if let Some(path) = output {
        let content = serde_json::to_string_pretty(&loaded.samples)
            .context("Failed to serialize samples")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write samples to {:?}", path))?;
        println!("Wrote {:?}", path);
    }
    Ok(())
}

fn cmd_audit(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Audit log not found: {:?}", path);
    }
    let entries =
        load_audit_log(path).with_context(|| format!("Failed to replay audit log {:?}", path))?;
    let summary = summarize_audit_log(&entries);

    println!("Entries:      {}", summary.total);
    println!("Auto-adopted: {}", summary.auto_adopted);
    println!("Suggested:    {}", summary.suggested);
    println!("Rejected:     {}", summary.rejected);
    for (reason, count) in &summary.reasons {
        println!("  {}: {}", reason, count);
    }
    Ok(())
}

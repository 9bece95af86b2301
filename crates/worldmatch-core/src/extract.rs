//! Mine "missing object" incidents from historical run artifacts.
//!
//! A run directory holds `turns_log.json` (array of turn records) and
//! `artifacts/<session>/world_canonical.json` (world snapshot whose `props`
//! keys are the valid object names). Each turn is scanned for three signals:
//!
//! - `invented_objects`: names the narrator used that are not in the world
//! - `blocked_target_before` / `blocked_target_after`: targets refused by the gate
//! - `denied_reason == "MISSING_OBJECT"`: unresolved `marker_targets_before`
//!
//! Ground truth is a heuristic pseudo-label (see [`infer_ground_truth`]).

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{MissingObjectSample, Result, WorldmatchError};
use crate::metrics::METRICS;
use crate::obs;

pub const TURNS_LOG_FILE: &str = "turns_log.json";
pub const WORLD_SNAPSHOT_FILE: &str = "world_canonical.json";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_RUN_PATTERN: &str = "gm_*";

/// Denial code for a hard missing-object refusal.
pub const MISSING_OBJECT_CODE: &str = "MISSING_OBJECT";

/// One entry of `turns_log.json`. Unknown fields are ignored. Absent, `null`
/// or wrongly typed fields fall back to their defaults, so one odd field never
/// costs the rest of the turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TurnRecord {
    #[serde(deserialize_with = "lenient_string")]
    pub session_id: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub turn_number: u32,
    #[serde(deserialize_with = "lenient_string")]
    pub speaker: String,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub scenario: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub denied_reason: Option<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub invented_objects: Vec<String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub invented_reasons: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub blocked_target_before: Option<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub blocked_target_after: Option<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub marker_targets_before: Vec<String>,
    #[serde(deserialize_with = "lenient_string_list")]
    pub marker_targets_after: Vec<String>,
    #[serde(deserialize_with = "lenient_opt_string")]
    pub resolved_target: Option<String>,
}

/// Strings pass through, numbers are rendered. Anything else is `None`.
fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(d)?))
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    let n = match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(n.unwrap_or_default())
}

fn lenient_string_list<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_string_map<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => map
            .into_iter()
            .filter_map(|(k, v)| scalar_text(v).map(|v| (k, v)))
            .collect(),
        _ => BTreeMap::new(),
    })
}

/// A run that could not be read during a directory sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRun {
    pub run_path: PathBuf,
    pub error: String,
}

/// Outcome of sweeping a results directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub samples: Vec<MissingObjectSample>,
    /// Run directories that matched the pattern, in visit order.
    pub runs: Vec<PathBuf>,
    pub failed_runs: Vec<FailedRun>,
}

/// Valid object names of a world snapshot: the keys of its `props` object.
pub fn extract_world_objects(path: &Path) -> Result<BTreeSet<String>> {
    let raw = fs::read_to_string(path)?;
    let world: Value = serde_json::from_str(&raw).map_err(|e| malformed(path, e))?;
    Ok(world
        .get("props")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default())
}

/// World snapshot of the first session (sorted by name) that has one.
fn find_world_snapshot(run_path: &Path) -> Result<Option<PathBuf>> {
    let artifacts = run_path.join(ARTIFACTS_DIR);
    if !artifacts.is_dir() {
        return Ok(None);
    }
    let mut sessions: Vec<PathBuf> = fs::read_dir(&artifacts)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    sessions.sort();
    Ok(sessions
        .into_iter()
        .map(|session| session.join(WORLD_SNAPSHOT_FILE))
        .find(|p| p.is_file()))
}

/// Extract samples from one run directory.
///
/// A run without `turns_log.json` yields no samples. A log that is not a JSON
/// array is a [`WorldmatchError::MalformedRunArtifact`]; an entry that is not
/// an object is skipped with a warning. `scenario` overrides the per-turn
/// scenario name.
pub fn extract_samples_from_run(
    run_path: &Path,
    scenario: Option<&str>,
) -> Result<Vec<MissingObjectSample>> {
    let turns_path = run_path.join(TURNS_LOG_FILE);
    if !turns_path.is_file() {
        tracing::debug!(run_path = %run_path.display(), "no turns log, skipping run");
        return Ok(Vec::new());
    }

    let world_objects = match find_world_snapshot(run_path)? {
        Some(path) => extract_world_objects(&path)?,
        None => BTreeSet::new(),
    };

    let raw = fs::read_to_string(&turns_path)?;
    let entries: Vec<Value> =
        serde_json::from_str(&raw).map_err(|e| malformed(&turns_path, e))?;
    let turns: Vec<TurnRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(turn) => Some(turn),
            Err(err) => {
                tracing::warn!(
                    turns_log = %turns_path.display(),
                    index,
                    error = %err,
                    "skipping unreadable turn"
                );
                None
            }
        })
        .collect();

    let mut samples = Vec::new();
    for turn in &turns {
        collect_turn_samples(run_path, turn, &world_objects, scenario, &mut samples);
    }

    METRICS.add_samples_extracted(samples.len() as u64);
    tracing::debug!(
        run_path = %run_path.display(),
        turns = turns.len(),
        samples = samples.len(),
        "run extracted"
    );
    Ok(samples)
}

fn collect_turn_samples(
    run_path: &Path,
    turn: &TurnRecord,
    world_objects: &BTreeSet<String>,
    scenario: Option<&str>,
    out: &mut Vec<MissingObjectSample>,
) {
    let scenario = scenario
        .or(turn.scenario.as_deref())
        .unwrap_or("unknown");
    let make = |kind: &str, query: &str, denied_reason: String| MissingObjectSample {
        sample_id: format!(
            "{}_t{}_{}_{}",
            turn.session_id, turn.turn_number, kind, query
        ),
        run_path: run_path.to_path_buf(),
        session_id: turn.session_id.clone(),
        turn_number: turn.turn_number,
        query: query.to_string(),
        world_objects: world_objects.clone(),
        scenario: scenario.to_string(),
        speaker: turn.speaker.clone(),
        denied_reason: Some(denied_reason),
        ground_truth: infer_ground_truth(query, turn, world_objects),
    };

    let mut seen: HashSet<&str> = HashSet::new();

    for obj in turn.invented_objects.iter().filter(|o| !o.is_empty()) {
        let reason = turn
            .invented_reasons
            .get(obj)
            .cloned()
            .unwrap_or_else(|| "invented_object".to_string());
        out.push(make("invented", obj, reason));
        seen.insert(obj.as_str());
    }

    for blocked in [&turn.blocked_target_before, &turn.blocked_target_after]
        .into_iter()
        .flatten()
        .filter(|b| !b.is_empty())
    {
        if turn.invented_objects.contains(blocked) || seen.contains(blocked.as_str()) {
            continue;
        }
        let reason = turn
            .denied_reason
            .clone()
            .unwrap_or_else(|| "blocked_target".to_string());
        out.push(make("blocked", blocked, reason));
        seen.insert(blocked.as_str());
    }

    if turn.denied_reason.as_deref() == Some(MISSING_OBJECT_CODE) {
        for target in &turn.marker_targets_before {
            if target.is_empty() || world_objects.contains(target) || seen.contains(target.as_str())
            {
                continue;
            }
            out.push(make("denied", target, MISSING_OBJECT_CODE.to_string()));
            seen.insert(target.as_str());
        }
    }
}

/// Best-effort pseudo-label for `query`. Checked in order:
///
/// 1. `query` is itself a world object
/// 2. case-insensitive substring either way (world objects in sorted order)
/// 3. a `marker_targets_after` entry in the world that differs from `query`
/// 4. `resolved_target`, if it is in the world
pub fn infer_ground_truth(
    query: &str,
    turn: &TurnRecord,
    world_objects: &BTreeSet<String>,
) -> Option<String> {
    if world_objects.contains(query) {
        return Some(query.to_string());
    }

    let query_lower = query.to_lowercase();
    if !query_lower.is_empty() {
        let hit = world_objects.iter().find(|obj| {
            let obj_lower = obj.to_lowercase();
            !obj_lower.is_empty()
                && (obj_lower.contains(&query_lower) || query_lower.contains(&obj_lower))
        });
        if let Some(obj) = hit {
            return Some(obj.clone());
        }
    }

    if let Some(target) = turn
        .marker_targets_after
        .iter()
        .find(|t| t.as_str() != query && world_objects.contains(*t))
    {
        return Some(target.clone());
    }

    turn.resolved_target
        .as_ref()
        .filter(|r| world_objects.contains(*r))
        .cloned()
}

/// Sweep every run directory under `results_dir` whose name matches `pattern`.
///
/// Runs are visited in sorted order. A run that fails to parse is recorded in
/// [`ExtractionReport::failed_runs`] and the sweep continues.
pub fn extract_samples_from_results_dir(
    results_dir: &Path,
    pattern: &str,
) -> Result<ExtractionReport> {
    let matcher = globset::GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| WorldmatchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?
        .compile_matcher();

    let mut report = ExtractionReport::default();
    if !results_dir.is_dir() {
        tracing::warn!(results_dir = %results_dir.display(), "results directory not found");
        return Ok(report);
    }

    let mut runs: Vec<PathBuf> = fs::read_dir(results_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| matcher.is_match(entry.file_name()))
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    runs.sort();

    for run in &runs {
        match extract_samples_from_run(run, None) {
            Ok(samples) => report.samples.extend(samples),
            Err(err) => {
                obs::emit_run_extraction_failed(run, &err);
                report.failed_runs.push(FailedRun {
                    run_path: run.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    report.runs = runs;

    obs::emit_extraction_completed(
        report.runs.len(),
        report.samples.len(),
        report.failed_runs.len(),
    );
    Ok(report)
}

/// Drop samples whose `sample_id` was already seen. First occurrence wins.
pub fn deduplicate_samples(samples: Vec<MissingObjectSample>) -> Vec<MissingObjectSample> {
    let mut seen = HashSet::new();
    samples
        .into_iter()
        .filter(|s| seen.insert(s.sample_id.clone()))
        .collect()
}

/// Split into `(with ground truth, without ground truth)`, order preserved.
pub fn partition_by_ground_truth(
    samples: Vec<MissingObjectSample>,
) -> (Vec<MissingObjectSample>, Vec<MissingObjectSample>) {
    samples.into_iter().partition(MissingObjectSample::has_ground_truth)
}

fn malformed(path: &Path, err: serde_json::Error) -> WorldmatchError {
    WorldmatchError::MalformedRunArtifact {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_run(root: &Path, name: &str, props: &[&str], turns: Value) -> PathBuf {
        let run = root.join(name);
        let session = run.join(ARTIFACTS_DIR).join("sess1");
        fs::create_dir_all(&session).expect("mkdir");
        let props: serde_json::Map<String, Value> =
            props.iter().map(|p| (p.to_string(), json!({}))).collect();
        fs::write(
            session.join(WORLD_SNAPSHOT_FILE),
            json!({ "props": props }).to_string(),
        )
        .expect("write world");
        fs::write(run.join(TURNS_LOG_FILE), turns.to_string()).expect("write turns");
        run
    }

    fn turn(value: Value) -> TurnRecord {
        serde_json::from_value(value).expect("turn record")
    }

    fn world(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_world_objects_from_props() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(WORLD_SNAPSHOT_FILE);
        fs::write(&path, r#"{"props": {"マグカップ": {}, "テレビ": {"on": true}}}"#)
            .expect("write");
        assert_eq!(
            extract_world_objects(&path).expect("parse"),
            world(&["マグカップ", "テレビ"])
        );

        fs::write(&path, r#"{"rooms": []}"#).expect("write");
        assert!(extract_world_objects(&path).expect("parse").is_empty());
    }

    #[test]
    fn test_turn_record_tolerates_nulls_and_missing_fields() {
        let t = turn(json!({
            "session_id": "s",
            "turn_number": 3,
            "invented_objects": null,
            "extra": "ignored"
        }));
        assert_eq!(t.turn_number, 3);
        assert!(t.invented_objects.is_empty());
        assert!(t.speaker.is_empty());
    }

    #[test]
    fn test_turn_record_coerces_wrong_field_types() {
        let t = turn(json!({
            "session_id": 42,
            "turn_number": "3",
            "speaker": ["not", "a", "name"],
            "scenario": {"name": "coffee_trap"},
            "invented_objects": ["カップ", null, 7, "皿"],
            "invented_reasons": {"カップ": "not_in_world", "皿": null},
            "marker_targets_after": "マグカップ",
            "resolved_target": false
        }));
        assert_eq!(t.session_id, "42");
        assert_eq!(t.turn_number, 3);
        assert!(t.speaker.is_empty());
        assert!(t.scenario.is_none());
        assert_eq!(t.invented_objects, vec!["カップ", "皿"]);
        assert_eq!(t.invented_reasons.len(), 1);
        assert!(t.marker_targets_after.is_empty());
        assert!(t.resolved_target.is_none());

        let negative = turn(json!({"turn_number": -1}));
        assert_eq!(negative.turn_number, 0);
    }

    #[test]
    fn test_bad_turn_is_skipped_not_whole_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = write_run(
            dir.path(),
            "gm_c",
            &["マグカップ"],
            json!([
                "not a turn",
                {"session_id": 7, "turn_number": "2", "invented_objects": [null, "カップ"]},
                42,
                {"session_id": "s", "turn_number": 3, "blocked_target_before": "皿"}
            ]),
        );

        let samples = extract_samples_from_run(&run, None).expect("extract");
        let ids: Vec<&str> = samples.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["7_t2_invented_カップ", "s_t3_blocked_皿"]);
        assert_eq!(samples[0].ground_truth.as_deref(), Some("マグカップ"));

        fs::write(run.join(TURNS_LOG_FILE), r#"{"turns": []}"#).expect("write");
        let err = extract_samples_from_run(&run, None).unwrap_err();
        assert!(matches!(err, WorldmatchError::MalformedRunArtifact { .. }));
    }

    #[test]
    fn test_invented_object_sample() {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = write_run(
            dir.path(),
            "gm_a",
            &["マグカップ", "テレビ"],
            json!([{
                "session_id": "sess1",
                "turn_number": 2,
                "speaker": "やな",
                "scenario": "coffee_trap",
                "invented_objects": ["カップ"],
                "invented_reasons": {"カップ": "not_in_world"}
            }]),
        );

        let samples = extract_samples_from_run(&run, None).expect("extract");
        assert_eq!(samples.len(), 1);
        let s = &samples[0];
        assert_eq!(s.sample_id, "sess1_t2_invented_カップ");
        assert_eq!(s.denied_reason.as_deref(), Some("not_in_world"));
        assert_eq!(s.scenario, "coffee_trap");
        assert_eq!(s.ground_truth.as_deref(), Some("マグカップ"));
        assert_eq!(s.world_objects, world(&["マグカップ", "テレビ"]));
    }

    #[test]
    fn test_blocked_and_denied_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let run = write_run(
            dir.path(),
            "gm_b",
            &["冷蔵庫"],
            json!([
                {
                    "session_id": "s",
                    "turn_number": 1,
                    "invented_objects": ["牛乳"],
                    "blocked_target_before": "牛乳",
                    "blocked_target_after": "ジュース"
                },
                {
                    "session_id": "s",
                    "turn_number": 2,
                    "denied_reason": "MISSING_OBJECT",
                    "blocked_target_before": "鍋",
                    "marker_targets_before": ["鍋", "フライパン", "冷蔵庫"]
                }
            ]),
        );

        let samples = extract_samples_from_run(&run, Some("override")).expect("extract");
        let ids: Vec<&str> = samples.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "s_t1_invented_牛乳",
                "s_t1_blocked_ジュース",
                "s_t2_blocked_鍋",
                "s_t2_denied_フライパン",
            ]
        );
        assert_eq!(samples[1].denied_reason.as_deref(), Some("blocked_target"));
        assert_eq!(samples[2].denied_reason.as_deref(), Some("MISSING_OBJECT"));
        assert!(samples.iter().all(|s| s.scenario == "override"));
    }

    #[test]
    fn test_missing_turns_log_yields_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let samples = extract_samples_from_run(dir.path(), None).expect("no log is fine");
        assert!(samples.is_empty());
    }

    #[test]
    fn test_malformed_turns_log_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(TURNS_LOG_FILE), "{not json").expect("write");
        let err = extract_samples_from_run(dir.path(), None).unwrap_err();
        assert!(matches!(err, WorldmatchError::MalformedRunArtifact { .. }));
    }

    #[test]
    fn test_ground_truth_heuristics_in_order() {
        let w = world(&["マグカップ", "テレビ", "大きなソファ"]);
        let empty = TurnRecord::default();

        assert_eq!(infer_ground_truth("テレビ", &empty, &w).as_deref(), Some("テレビ"));
        assert_eq!(infer_ground_truth("カップ", &empty, &w).as_deref(), Some("マグカップ"));
        assert_eq!(
            infer_ground_truth("白いマグカップ", &empty, &w).as_deref(),
            Some("マグカップ")
        );

        let marker = turn(json!({"marker_targets_after": ["茶碗", "テレビ"]}));
        assert_eq!(infer_ground_truth("リモコン", &marker, &w).as_deref(), Some("テレビ"));

        let resolved = turn(json!({"resolved_target": "大きなソファ"}));
        assert_eq!(
            infer_ground_truth("長椅子", &resolved, &w).as_deref(),
            Some("大きなソファ")
        );

        let stray = turn(json!({"resolved_target": "幽霊"}));
        assert_eq!(infer_ground_truth("長椅子", &stray, &w), None);
    }

    #[test]
    fn test_ground_truth_substring_is_case_insensitive() {
        let w = world(&["Coffee Table"]);
        assert_eq!(
            infer_ground_truth("coffee", &TurnRecord::default(), &w).as_deref(),
            Some("Coffee Table")
        );
    }

    #[test]
    fn test_results_dir_sweep_pattern_order_and_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let turns = |sid: &str| json!([{"session_id": sid, "turn_number": 1, "invented_objects": ["カップ"]}]);
        write_run(dir.path(), "gm_2", &["マグカップ"], turns("b"));
        write_run(dir.path(), "gm_1", &["マグカップ"], turns("a"));
        write_run(dir.path(), "other_1", &["マグカップ"], turns("c"));
        let broken = dir.path().join("gm_3");
        fs::create_dir_all(&broken).expect("mkdir");
        fs::write(broken.join(TURNS_LOG_FILE), "[{").expect("write");

        let report = extract_samples_from_results_dir(dir.path(), "gm_*").expect("sweep");
        let ids: Vec<&str> = report.samples.iter().map(|s| s.sample_id.as_str()).collect();
        assert_eq!(ids, vec!["a_t1_invented_カップ", "b_t1_invented_カップ"]);
        assert_eq!(report.runs.len(), 3);
        assert_eq!(report.failed_runs.len(), 1);
        assert_eq!(report.failed_runs[0].run_path, broken);
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = extract_samples_from_results_dir(dir.path(), "gm_[").unwrap_err();
        assert!(matches!(err, WorldmatchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_deduplicate_and_partition() {
        let base = MissingObjectSample {
            sample_id: "x".to_string(),
            run_path: PathBuf::from("r"),
            session_id: "s".to_string(),
            turn_number: 1,
            query: "q".to_string(),
            world_objects: BTreeSet::new(),
            scenario: "unknown".to_string(),
            speaker: String::new(),
            denied_reason: None,
            ground_truth: Some("first".to_string()),
        };
        let dup = MissingObjectSample {
            ground_truth: Some("second".to_string()),
            ..base.clone()
        };
        let other = MissingObjectSample {
            sample_id: "y".to_string(),
            ground_truth: None,
            ..base.clone()
        };

        let unique = deduplicate_samples(vec![base, dup, other]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].ground_truth.as_deref(), Some("first"));

        let (with_gt, without_gt) = partition_by_ground_truth(unique);
        assert_eq!(with_gt.len(), 1);
        assert_eq!(without_gt[0].sample_id, "y");
    }
}

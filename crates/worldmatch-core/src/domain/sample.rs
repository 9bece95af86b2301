//! Missing-object samples mined from historical runs.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single "missing object" incident extracted from a run log.
///
/// `ground_truth` is a heuristic pseudo-label, not a verified answer. Samples
/// without one are kept for manual review but excluded from metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingObjectSample {
    /// `{session}_t{turn}_{source}_{query}`; stable across re-extraction.
    pub sample_id: String,
    pub run_path: PathBuf,
    pub session_id: String,
    pub turn_number: u32,
    /// The object name that did not exist.
    pub query: String,
    /// Objects valid at that point in the run.
    pub world_objects: BTreeSet<String>,
    pub scenario: String,
    pub speaker: String,
    pub denied_reason: Option<String>,
    pub ground_truth: Option<String>,
}

impl MissingObjectSample {
    pub fn has_ground_truth(&self) -> bool {
        self.ground_truth.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_serde_roundtrip() {
        let sample = MissingObjectSample {
            sample_id: "sess_t1_invented_カップ".to_string(),
            run_path: PathBuf::from("/tmp/run"),
            session_id: "sess".to_string(),
            turn_number: 1,
            query: "カップ".to_string(),
            world_objects: ["マグカップ".to_string()].into_iter().collect(),
            scenario: "coffee_trap".to_string(),
            speaker: "あゆ".to_string(),
            denied_reason: Some("not_in_world".to_string()),
            ground_truth: Some("マグカップ".to_string()),
        };

        let json = serde_json::to_string(&sample).expect("serialize");
        let back: MissingObjectSample = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(sample, back);
        assert!(back.has_ground_truth());
    }
}

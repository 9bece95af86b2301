//! Audit log record for a single match attempt.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::{AdoptionStatus, MatchMethod, MatchResult, RejectionReason};

/// Candidate as recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub name: String,
    pub score: f64,
    pub method: MatchMethod,
}

/// One line of the audit log.
///
/// Built from a [`MatchResult`] at the moment of logging; the world set is
/// snapshotted in sorted order so replays are byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub input_query: String,
    pub world_objects: Vec<String>,
    pub candidates: Vec<CandidateRecord>,
    pub adopted: Option<String>,
    pub status: AdoptionStatus,
    #[serde(default)]
    pub rejection_reason: Option<RejectionReason>,
}

impl AuditLogEntry {
    /// Snapshot a match result and the world it was matched against.
    pub fn from_match_result(result: &MatchResult, world_objects: &BTreeSet<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            input_query: result.query().to_string(),
            world_objects: world_objects.iter().cloned().collect(),
            candidates: result
                .candidates()
                .iter()
                .map(|c| CandidateRecord {
                    name: c.name().to_string(),
                    score: c.score(),
                    method: c.method(),
                })
                .collect(),
            adopted: result.adopted().map(|c| c.name().to_string()),
            status: result.status(),
            rejection_reason: result.rejection_reason(),
        }
    }
}

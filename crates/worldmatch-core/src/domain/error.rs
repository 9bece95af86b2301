//! Domain-level error taxonomy for worldmatch.
//!
//! Only configuration mistakes and environment problems are errors. Bad match
//! input (empty query, empty world) is a `Rejected` result, never an `Err`.

use std::path::PathBuf;

/// worldmatch domain errors.
#[derive(Debug, thiserror::Error)]
pub enum WorldmatchError {
    #[error("candidate score must be within [0.0, 1.0], got {score}")]
    InvalidScore { score: f64 },

    #[error("invalid matcher config: {0}")]
    InvalidConfig(String),

    #[error("threshold grid must not be empty")]
    EmptyThresholdGrid,

    #[error("invalid run pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("malformed run artifact {path:?}: {reason}")]
    MalformedRunArtifact { path: PathBuf, reason: String },

    #[error("malformed audit log {path:?} at line {line}: {source}")]
    MalformedAuditLog {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for worldmatch domain operations.
pub type Result<T> = std::result::Result<T, WorldmatchError>;

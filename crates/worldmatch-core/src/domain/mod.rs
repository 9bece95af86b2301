//! Domain models for worldmatch.
//!
//! Canonical definitions for the core entities:
//! - `Candidate` / `MatchResult`: one resolution attempt against a closed world
//! - `AuditLogEntry`: append-only trace of a match attempt
//! - `MissingObjectSample`: an incident mined from a historical run
//! - `EvalResult` / `EvalMetrics` / `EvalSummary`: threshold-sweep evaluation

pub mod audit;
pub mod candidate;
pub mod error;
pub mod eval;
pub mod sample;

// Re-export main types and errors
pub use audit::{AuditLogEntry, CandidateRecord};
pub use candidate::{
    is_generic_noun, AdoptionStatus, Candidate, MatchMethod, MatchResult, RejectionReason,
    GENERIC_NOUNS,
};
pub use error::{Result, WorldmatchError};
pub use eval::{EvalMetrics, EvalOutcome, EvalResult, EvalSummary, ScoredName};
pub use sample::MissingObjectSample;

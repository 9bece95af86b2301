//! Global atomic counters for matcher and extraction activity.
//!
//! Counters are bumped at the call site with no logging beyond `trace!`.
//! Call [`Metrics::flush`] at the end of a command to emit them as one
//! `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::AdoptionStatus;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    matches_attempted: AtomicU64,
    exact_matches: AtomicU64,
    auto_adopted: AtomicU64,
    suggested: AtomicU64,
    rejected: AtomicU64,
    samples_extracted: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub matches_attempted: u64,
    pub exact_matches: u64,
    pub auto_adopted: u64,
    pub suggested: u64,
    pub rejected: u64,
    pub samples_extracted: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            matches_attempted: AtomicU64::new(0),
            exact_matches: AtomicU64::new(0),
            auto_adopted: AtomicU64::new(0),
            suggested: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            samples_extracted: AtomicU64::new(0),
        }
    }

    pub fn inc_matches_attempted(&self) {
        self.matches_attempted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "matches_attempted", "counter incremented");
    }

    pub fn inc_exact_matches(&self) {
        self.exact_matches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "exact_matches", "counter incremented");
    }

    /// Bump the counter for the final status of a match.
    pub fn record_status(&self, status: AdoptionStatus) {
        let counter = match status {
            AdoptionStatus::AutoAdopted => &self.auto_adopted,
            AdoptionStatus::Suggested => &self.suggested,
            AdoptionStatus::Rejected => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = %status, "counter incremented");
    }

    pub fn add_samples_extracted(&self, n: u64) {
        self.samples_extracted.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "samples_extracted", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            matches_attempted = s.matches_attempted,
            exact_matches = s.exact_matches,
            auto_adopted = s.auto_adopted,
            suggested = s.suggested,
            rejected = s.rejected,
            samples_extracted = s.samples_extracted,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            matches_attempted: self.matches_attempted.load(Ordering::Relaxed),
            exact_matches: self.exact_matches.load(Ordering::Relaxed),
            auto_adopted: self.auto_adopted.load(Ordering::Relaxed),
            suggested: self.suggested.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            samples_extracted: self.samples_extracted.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.matches_attempted,
            &self.exact_matches,
            &self.auto_adopted,
            &self.suggested,
            &self.rejected,
            &self.samples_extracted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

//! Matcher interface and adoption policy.
//!
//! A [`Matcher`] ranks world objects against a query. Strategies only supply
//! [`Matcher::find_candidates`]; the provided [`Matcher::match_query`] applies
//! the input guards, the exact-match fast path, world-membership enforcement,
//! and the adoption decision, so every strategy gets them for free.
//!
//! # Invariant
//!
//! Every candidate name in a returned [`MatchResult`] is a member of the
//! `world_objects` set passed to that call.

pub mod fuzzy;
pub mod preprocess;
pub mod similarity;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::candidate::sort_by_score;
use crate::domain::{
    is_generic_noun, Candidate, MatchResult, RejectionReason, Result, WorldmatchError,
};
use crate::metrics::METRICS;
use crate::obs;

/// Default candidate list cap.
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Adoption thresholds, fixed at matcher construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Score at or above which the top candidate may be adopted automatically.
    pub auto_adopt_threshold: f64,
    /// Candidates scoring below this are discarded.
    pub suggest_threshold: f64,
    /// When false, fuzzy matches are only ever suggested.
    pub allow_auto_adopt: bool,
    /// Maximum number of candidates returned.
    pub max_candidates: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            auto_adopt_threshold: 0.9,
            suggest_threshold: 0.7,
            allow_auto_adopt: false,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl MatcherConfig {
    /// Suggestion-only config at the given threshold.
    pub fn suggest_only(suggest_threshold: f64) -> Self {
        Self {
            auto_adopt_threshold: suggest_threshold.max(Self::default().auto_adopt_threshold),
            suggest_threshold,
            allow_auto_adopt: false,
            ..Self::default()
        }
    }

    /// Check threshold ranges and ordering.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("auto_adopt_threshold", self.auto_adopt_threshold),
            ("suggest_threshold", self.suggest_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WorldmatchError::InvalidConfig(format!(
                    "{} must be within [0.0, 1.0], got {}",
                    name, value
                )));
            }
        }
        if self.auto_adopt_threshold < self.suggest_threshold {
            return Err(WorldmatchError::InvalidConfig(format!(
                "auto_adopt_threshold ({}) must be >= suggest_threshold ({})",
                self.auto_adopt_threshold, self.suggest_threshold
            )));
        }
        if self.max_candidates == 0 {
            return Err(WorldmatchError::InvalidConfig(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve a query against a closed set of world objects.
pub trait Matcher {
    /// Thresholds this matcher was built with.
    fn config(&self) -> &MatcherConfig;

    /// Rank world objects for `query`, score descending, at most `limit`
    /// entries, none below `suggest_threshold`.
    fn find_candidates(
        &self,
        query: &str,
        world_objects: &BTreeSet<String>,
        limit: usize,
    ) -> Vec<Candidate>;

    /// Match `query` and decide adoption. Never fails on input data.
    fn match_query(&self, query: &str, world_objects: &BTreeSet<String>) -> MatchResult {
        METRICS.inc_matches_attempted();

        let result = if world_objects.is_empty() {
            MatchResult::rejected(query, RejectionReason::EmptyWorldObjects)
        } else if query.is_empty() {
            MatchResult::rejected(query, RejectionReason::EmptyQuery)
        } else if world_objects.contains(query) {
            METRICS.inc_exact_matches();
            MatchResult::exact(query)
        } else {
            let config = self.config();
            let ranked = self.find_candidates(query, world_objects, config.max_candidates);
            let mut candidates = sort_by_score(retain_world_members(
                ranked,
                world_objects,
                config.suggest_threshold,
            ));
            candidates.truncate(config.max_candidates);
            self.decide(query, candidates)
        };

        METRICS.record_status(result.status());
        obs::emit_match_completed(
            query,
            result.status(),
            result.candidates().len(),
            result.top().map(Candidate::score),
        );
        result
    }

    /// Policy hook: may this candidate be adopted without asking the caller?
    fn should_auto_adopt(&self, candidate: &Candidate) -> bool {
        let config = self.config();
        config.allow_auto_adopt
            && !is_generic_noun(candidate.name())
            && candidate.score() >= config.auto_adopt_threshold
    }

    /// Adoption decision for the fuzzy path.
    fn decide(&self, query: &str, candidates: Vec<Candidate>) -> MatchResult {
        let Some(top) = candidates.first() else {
            return MatchResult::rejected(query, RejectionReason::NoCandidatesAboveThreshold);
        };
        if self.should_auto_adopt(top) {
            return MatchResult::auto_adopted(query, candidates);
        }
        let reason = is_generic_noun(top.name()).then_some(RejectionReason::GenericNounNoAutoAdopt);
        MatchResult::suggested(query, candidates, reason)
    }
}

/// Drop anything a strategy produced that is not in the world or is below
/// the suggestion floor.
fn retain_world_members(
    candidates: Vec<Candidate>,
    world_objects: &BTreeSet<String>,
    suggest_threshold: f64,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| {
            let member = world_objects.contains(c.name());
            if !member {
                obs::emit_world_expansion_blocked(c.name());
            }
            member && c.score() >= suggest_threshold
        })
        .collect()
}

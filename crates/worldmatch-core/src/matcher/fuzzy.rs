//! String-similarity matcher.

use std::collections::BTreeSet;

use crate::domain::candidate::sort_by_score;
use crate::domain::{Candidate, MatchMethod, Result};

use super::similarity::SimilarityBackend;
use super::{Matcher, MatcherConfig};

/// Ranks every world object by string similarity to the query.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    config: MatcherConfig,
    backend: SimilarityBackend,
}

impl FuzzyMatcher {
    /// Build with the best available backend. Fails on an invalid config.
    pub fn new(config: MatcherConfig) -> Result<Self> {
        Self::with_backend(config, SimilarityBackend::detect())
    }

    /// Build with an explicit backend. Fails on an invalid config.
    pub fn with_backend(config: MatcherConfig, backend: SimilarityBackend) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, backend })
    }

    pub fn backend(&self) -> SimilarityBackend {
        self.backend
    }
}

impl Matcher for FuzzyMatcher {
    fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn find_candidates(
        &self,
        query: &str,
        world_objects: &BTreeSet<String>,
        limit: usize,
    ) -> Vec<Candidate> {
        if query.is_empty() || world_objects.is_empty() {
            return Vec::new();
        }

        let scored = world_objects
            .iter()
            .filter_map(|name| {
                let score = self.backend.score(query, name);
                if score < self.config.suggest_threshold {
                    return None;
                }
                Candidate::new(name.as_str(), score, MatchMethod::Fuzzy).ok()
            })
            .collect();

        let mut ranked = sort_by_score(scored);
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdoptionStatus, RejectionReason};

    fn world(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn indel(config: MatcherConfig) -> FuzzyMatcher {
        FuzzyMatcher::with_backend(config, SimilarityBackend::Indel).expect("valid config")
    }

    #[test]
    fn test_new_rejects_inverted_thresholds() {
        let config = MatcherConfig {
            auto_adopt_threshold: 0.6,
            suggest_threshold: 0.7,
            ..MatcherConfig::default()
        };
        assert!(FuzzyMatcher::new(config).is_err());
    }

    #[test]
    fn test_exact_match_returns_perfect_score() {
        let matcher = FuzzyMatcher::new(MatcherConfig::default()).expect("valid config");
        let w = world(&["コーヒー豆", "コーヒーメーカー", "マグカップ"]);
        let result = matcher.match_query("コーヒー豆", &w);

        assert_eq!(result.status(), AdoptionStatus::AutoAdopted);
        assert_eq!(result.candidates().len(), 1);
        let top = result.top().expect("one candidate");
        assert_eq!(top.name(), "コーヒー豆");
        assert_eq!(top.score(), 1.0);
        assert_eq!(top.method(), MatchMethod::Exact);
    }

    #[test]
    fn test_partial_match_japanese() {
        let matcher = indel(MatcherConfig {
            suggest_threshold: 0.5,
            ..MatcherConfig::default()
        });
        let w = world(&["コーヒー豆", "コーヒーメーカー", "マグカップ"]);
        let result = matcher.match_query("コーヒ", &w);

        assert!(!result.candidates().is_empty());
        assert!(result.top().expect("top").name().contains("コーヒー"));
        assert_eq!(result.status(), AdoptionStatus::Suggested);
    }

    #[test]
    fn test_default_matcher_suggests_partial_japanese() {
        let matcher = FuzzyMatcher::new(MatcherConfig::default()).expect("valid config");
        let result = matcher.match_query("コーヒ", &world(&["コーヒー豆"]));

        assert_eq!(result.status(), AdoptionStatus::Suggested);
        let top = result.top().expect("top");
        assert_eq!(top.name(), "コーヒー豆");
        assert!((top.score() - 0.75).abs() < 1e-9);
        assert_eq!(top.method(), MatchMethod::Fuzzy);
    }

    #[test]
    fn test_scenarios_hold_for_every_backend() {
        for &backend in SimilarityBackend::available() {
            let loose = FuzzyMatcher::with_backend(
                MatcherConfig {
                    suggest_threshold: 0.5,
                    ..MatcherConfig::default()
                },
                backend,
            )
            .expect("valid config");
            let strict =
                FuzzyMatcher::with_backend(MatcherConfig::default(), backend).expect("valid config");

            let w = world(&["コーヒー豆", "コーヒーメーカー", "マグカップ"]);
            let result = loose.match_query("コーヒ", &w);
            assert_eq!(result.status(), AdoptionStatus::Suggested, "{}", backend);
            assert!(result.top().expect("top").name().contains("コーヒー"), "{}", backend);

            let result = strict.match_query("コーヒー豆", &world(&["コーヒー豆", "マグカップ"]));
            assert_eq!(result.status(), AdoptionStatus::AutoAdopted, "{}", backend);
            assert_eq!(result.top().map(Candidate::score), Some(1.0));

            let result = strict.match_query("xyz", &world(&["本棚", "ソファ", "テレビ"]));
            assert_eq!(result.status(), AdoptionStatus::Rejected, "{}", backend);

            let result = strict.match_query("coffe", &world(&["coffee", "table", "chair"]));
            assert_eq!(result.top().map(Candidate::name), Some("coffee"), "{}", backend);

            let result = strict.match_query("", &world(&["本棚"]));
            assert_eq!(result.rejection_reason(), Some(RejectionReason::EmptyQuery));
        }
    }

    #[test]
    fn test_no_match_for_unrelated_query() {
        let matcher = indel(MatcherConfig::default());
        let result = matcher.match_query("xyz", &world(&["本棚", "ソファ", "テレビ"]));

        assert!(result.candidates().is_empty());
        assert_eq!(result.status(), AdoptionStatus::Rejected);
        assert_eq!(
            result.rejection_reason(),
            Some(RejectionReason::NoCandidatesAboveThreshold)
        );
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        let matcher = FuzzyMatcher::new(MatcherConfig::default()).expect("valid config");

        let result = matcher.match_query("", &world(&["本棚"]));
        assert!(result.candidates().is_empty());
        assert_eq!(result.rejection_reason(), Some(RejectionReason::EmptyQuery));

        let result = matcher.match_query("本棚", &BTreeSet::new());
        assert_eq!(result.status(), AdoptionStatus::Rejected);
        assert_eq!(result.rejection_reason(), Some(RejectionReason::EmptyWorldObjects));
    }

    #[test]
    fn test_english_fuzzy_match() {
        let matcher = indel(MatcherConfig {
            suggest_threshold: 0.6,
            ..MatcherConfig::default()
        });
        let result = matcher.match_query("coffe", &world(&["coffee", "table", "chair"]));
        assert_eq!(result.top().map(Candidate::name), Some("coffee"));
    }

    #[test]
    fn test_candidate_limit() {
        let matcher = indel(MatcherConfig {
            suggest_threshold: 0.0,
            auto_adopt_threshold: 0.9,
            max_candidates: 2,
            allow_auto_adopt: false,
        });
        let w = world(&["a1", "a2", "a3", "a4"]);
        let result = matcher.match_query("a", &w);
        assert_eq!(result.candidates().len(), 2);
    }

    #[test]
    fn test_auto_adopt_when_enabled_and_strong() {
        let matcher = indel(MatcherConfig {
            auto_adopt_threshold: 0.9,
            suggest_threshold: 0.5,
            allow_auto_adopt: true,
            ..MatcherConfig::default()
        });
        // LCS 11 over 23 chars -> 22/23
        let result = matcher.match_query("refrigerato", &world(&["refrigerator", "sofa"]));
        assert_eq!(result.status(), AdoptionStatus::AutoAdopted);
        assert_eq!(result.adopted().map(Candidate::name), Some("refrigerator"));
    }

    #[test]
    fn test_high_score_not_adopted_when_disabled() {
        let matcher = indel(MatcherConfig {
            suggest_threshold: 0.5,
            ..MatcherConfig::default()
        });
        let result = matcher.match_query("refrigerato", &world(&["refrigerator", "sofa"]));
        assert_eq!(result.status(), AdoptionStatus::Suggested);
        assert!(result.adopted().is_none());
    }

    #[test]
    fn test_generic_noun_suggested_with_reason() {
        let matcher = indel(MatcherConfig {
            auto_adopt_threshold: 0.7,
            suggest_threshold: 0.5,
            allow_auto_adopt: true,
            ..MatcherConfig::default()
        });
        // "floo" vs "floor": 8 / 9
        let result = matcher.match_query("floo", &world(&["floor", "table"]));
        assert_eq!(result.status(), AdoptionStatus::Suggested);
        assert!(result.adopted().is_none());
        assert_eq!(
            result.rejection_reason(),
            Some(RejectionReason::GenericNounNoAutoAdopt)
        );
    }

    #[test]
    fn test_find_candidates_respects_floor_and_order() {
        let matcher = indel(MatcherConfig {
            suggest_threshold: 0.3,
            ..MatcherConfig::default()
        });
        let w = world(&["マグカップ", "ティーカップ", "コーヒーメーカー", "本棚"]);
        let ranked = matcher.find_candidates("カップ", &w, 5);

        assert!(ranked.iter().all(|c| c.score() >= 0.3));
        assert!(ranked.windows(2).all(|p| p[0].score() >= p[1].score()));
        assert!(ranked.iter().all(|c| w.contains(c.name())));
    }
}

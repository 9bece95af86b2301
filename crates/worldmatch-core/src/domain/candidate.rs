//! Match vocabulary: candidates, adoption status, and match results.

use serde::{Deserialize, Serialize};

use super::error::{Result, WorldmatchError};

/// Nouns that name the fabric of a scene rather than an interactable object.
///
/// Consulted by the adoption policy only; ranking never looks at this list.
pub const GENERIC_NOUNS: &[&str] = &[
    "床", "壁", "天井", "空気", "部屋", "場所", "floor", "wall", "ceiling", "air", "room", "place",
];

/// Whether `name` is one of the [`GENERIC_NOUNS`] (ASCII case-insensitive).
pub fn is_generic_noun(name: &str) -> bool {
    GENERIC_NOUNS.iter().any(|g| g.eq_ignore_ascii_case(name))
}

/// How a candidate was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// The query is literally a world object.
    Exact,
    /// String-similarity ranking.
    Fuzzy,
}

/// Outcome of the adoption policy for one match call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdoptionStatus {
    AutoAdopted,
    Suggested,
    Rejected,
}

impl AdoptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoAdopted => "auto_adopted",
            Self::Suggested => "suggested",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AdoptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reason attached to rejected (or guarded) results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    EmptyQuery,
    EmptyWorldObjects,
    NoCandidatesAboveThreshold,
    /// Top candidate was a generic noun, so it is only ever suggested.
    GenericNounNoAutoAdopt,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::EmptyWorldObjects => "empty_world_objects",
            Self::NoCandidatesAboveThreshold => "no_candidates_above_threshold",
            Self::GenericNounNoAutoAdopt => "generic_noun_no_auto_adopt",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct RawCandidate {
    name: String,
    score: f64,
    method: MatchMethod,
}

/// One possible resolution of a query to a world object.
///
/// The score is validated at construction and the value is read-only after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCandidate")]
pub struct Candidate {
    name: String,
    score: f64,
    method: MatchMethod,
}

impl Candidate {
    /// Create a candidate, failing if `score` is outside `[0.0, 1.0]` (or NaN).
    pub fn new(name: impl Into<String>, score: f64, method: MatchMethod) -> Result<Self> {
        if !(0.0..=1.0).contains(&score) {
            return Err(WorldmatchError::InvalidScore { score });
        }
        Ok(Self {
            name: name.into(),
            score,
            method,
        })
    }

    /// Exact-match candidate with score 1.0.
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: 1.0,
            method: MatchMethod::Exact,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn method(&self) -> MatchMethod {
        self.method
    }
}

impl TryFrom<RawCandidate> for Candidate {
    type Error = WorldmatchError;

    fn try_from(raw: RawCandidate) -> Result<Self> {
        Candidate::new(raw.name, raw.score, raw.method)
    }
}

/// Result of one matcher invocation.
///
/// # Invariants
///
/// - `candidates` is sorted by score descending.
/// - `adopted` is present iff `status == AutoAdopted`, and then equals the
///   top candidate.
/// - `status == Rejected` implies `candidates` is empty.
///
/// The constructors are the only way to build a value, so these hold for every
/// result handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    query: String,
    candidates: Vec<Candidate>,
    adopted: Option<Candidate>,
    status: AdoptionStatus,
    rejection_reason: Option<RejectionReason>,
}

impl MatchResult {
    /// Rejected result with no candidates.
    pub fn rejected(query: impl Into<String>, reason: RejectionReason) -> Self {
        Self {
            query: query.into(),
            candidates: Vec::new(),
            adopted: None,
            status: AdoptionStatus::Rejected,
            rejection_reason: Some(reason),
        }
    }

    /// Exact hit: a single score-1.0 candidate, always adopted.
    pub fn exact(query: impl Into<String>) -> Self {
        let query = query.into();
        let candidate = Candidate::exact(query.clone());
        Self {
            query,
            candidates: vec![candidate.clone()],
            adopted: Some(candidate),
            status: AdoptionStatus::AutoAdopted,
            rejection_reason: None,
        }
    }

    /// Candidates offered to the caller without adoption.
    ///
    /// An empty candidate list yields a `no_candidates_above_threshold` rejection.
    pub fn suggested(
        query: impl Into<String>,
        candidates: Vec<Candidate>,
        reason: Option<RejectionReason>,
    ) -> Self {
        let query = query.into();
        if candidates.is_empty() {
            return Self::rejected(query, RejectionReason::NoCandidatesAboveThreshold);
        }
        Self {
            query,
            candidates: sort_by_score(candidates),
            adopted: None,
            status: AdoptionStatus::Suggested,
            rejection_reason: reason,
        }
    }

    /// Top candidate adopted automatically.
    ///
    /// An empty candidate list yields a `no_candidates_above_threshold` rejection.
    pub fn auto_adopted(query: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        let query = query.into();
        let candidates = sort_by_score(candidates);
        let Some(top) = candidates.first().cloned() else {
            return Self::rejected(query, RejectionReason::NoCandidatesAboveThreshold);
        };
        Self {
            query,
            candidates,
            adopted: Some(top),
            status: AdoptionStatus::AutoAdopted,
            rejection_reason: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn adopted(&self) -> Option<&Candidate> {
        self.adopted.as_ref()
    }

    pub fn status(&self) -> AdoptionStatus {
        self.status
    }

    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        self.rejection_reason
    }

    /// Highest-scoring candidate, if any.
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// Score descending, name ascending on ties. Stable, so identical input
/// always yields identical order.
pub(crate) fn sort_by_score(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.name.cmp(&b.name))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fuzzy(name: &str, score: f64) -> Candidate {
        Candidate::new(name, score, MatchMethod::Fuzzy).expect("valid score")
    }

    #[test]
    fn test_candidate_rejects_out_of_range_score() {
        assert!(Candidate::new("a", 1.01, MatchMethod::Fuzzy).is_err());
        assert!(Candidate::new("a", -0.01, MatchMethod::Fuzzy).is_err());
        assert!(Candidate::new("a", f64::NAN, MatchMethod::Fuzzy).is_err());
    }

    #[test]
    fn test_candidate_accepts_bounds() {
        assert!(Candidate::new("a", 0.0, MatchMethod::Fuzzy).is_ok());
        assert!(Candidate::new("a", 1.0, MatchMethod::Exact).is_ok());
    }

    #[test]
    fn test_candidate_deserialize_validates_score() {
        let ok: Candidate =
            serde_json::from_str(r#"{"name":"マグカップ","score":0.8,"method":"fuzzy"}"#)
                .expect("valid candidate");
        assert_eq!(ok.name(), "マグカップ");
        assert_eq!(ok.method(), MatchMethod::Fuzzy);

        let bad = serde_json::from_str::<Candidate>(r#"{"name":"x","score":2.0,"method":"fuzzy"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_generic_noun_lookup() {
        assert!(is_generic_noun("床"));
        assert!(is_generic_noun("Floor"));
        assert!(!is_generic_noun("マグカップ"));
    }

    #[test]
    fn test_exact_result_is_adopted() {
        let result = MatchResult::exact("テレビ");
        assert_eq!(result.status(), AdoptionStatus::AutoAdopted);
        assert_eq!(result.candidates().len(), 1);
        assert_eq!(result.adopted(), result.top());
        assert_eq!(result.top().map(Candidate::method), Some(MatchMethod::Exact));
    }

    #[test]
    fn test_suggested_sorts_and_leaves_adopted_empty() {
        let result = MatchResult::suggested("q", vec![fuzzy("b", 0.7), fuzzy("a", 0.9)], None);
        assert_eq!(result.status(), AdoptionStatus::Suggested);
        assert!(result.adopted().is_none());
        assert_eq!(result.top().map(Candidate::name), Some("a"));
    }

    #[test]
    fn test_empty_suggestion_becomes_rejection() {
        let result = MatchResult::suggested("q", vec![], None);
        assert_eq!(result.status(), AdoptionStatus::Rejected);
        assert_eq!(
            result.rejection_reason(),
            Some(RejectionReason::NoCandidatesAboveThreshold)
        );
    }

    #[test]
    fn test_ties_break_by_name() {
        let sorted = sort_by_score(vec![fuzzy("c", 0.8), fuzzy("a", 0.8), fuzzy("b", 0.9)]);
        let names: Vec<&str> = sorted.iter().map(Candidate::name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&AdoptionStatus::AutoAdopted).expect("serialize");
        assert_eq!(json, "\"auto_adopted\"");
        let json = serde_json::to_string(&RejectionReason::EmptyWorldObjects).expect("serialize");
        assert_eq!(json, "\"empty_world_objects\"");
    }
}

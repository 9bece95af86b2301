//! Query normalisation and expansion.
//!
//! Free-text queries from a narrator often wrap the object name in a
//! possessive ("冷蔵庫の牛乳") or an action ("ソファーに座る"). The helpers here
//! peel those apart into shorter queries. Expansion never invents objects:
//! when a world set is supplied only its members survive.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::Result;

use super::fuzzy::FuzzyMatcher;
use super::similarity::SimilarityBackend;
use super::{Matcher, MatcherConfig};

/// Longest query (in characters) that is tried as-is.
pub const MAX_QUERY_LENGTH: usize = 20;

/// Particles that end the object phrase of an action description, in priority order.
pub const ACTION_PARTICLES: &[&str] = &["に", "へ", "を", "で", "から", "まで"];

static QUOTES: OnceLock<Option<Regex>> = OnceLock::new();
static TRAILING_PUNCT: OnceLock<Option<Regex>> = OnceLock::new();
static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
static X_NO_Y: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn replace_all(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> String {
    match compiled(cell, pattern) {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Trim, drop quotes and brackets, drop trailing punctuation, remove all whitespace.
pub fn normalize_query(query: &str) -> String {
    let result = query.trim();
    let result = replace_all(&QUOTES, r#"[「」『』"'()（）]"#, result);
    let result = replace_all(&TRAILING_PUNCT, r"[。、,.！？!?]+$", &result);
    replace_all(&WHITESPACE, r"[\s\x{3000}]+", &result)
}

/// Split "XのY" at the first `の` preceded by at least one character.
pub fn extract_x_no_y_pattern(query: &str) -> Option<(String, String)> {
    let re = compiled(&X_NO_Y, r"^(.+?)の(.+)$")?;
    let caps = re.captures(query)?;
    let x = caps.get(1)?.as_str().trim();
    let y = caps.get(2)?.as_str().trim();
    if x.is_empty() || y.is_empty() {
        return None;
    }
    Some((x.to_string(), y.to_string()))
}

/// Object phrase in front of the first action particle found.
pub fn extract_action_object(query: &str) -> Vec<String> {
    let Some(particle) = ACTION_PARTICLES.iter().find(|p| query.contains(**p)) else {
        return Vec::new();
    };
    let head = query.split(*particle).next().unwrap_or_default();
    let object = normalize_query(head);
    if object.is_empty() || char_len(&object) > MAX_QUERY_LENGTH {
        return Vec::new();
    }
    vec![object]
}

/// Ordered, de-duplicated expansions of `query`.
///
/// Order: X and Y of "XのY" (Y only when short), X of a nested "の" in Y,
/// the action object, then the normalised query itself when short. With a
/// world set, only members are kept.
pub fn expand_queries(query: &str, world_objects: Option<&BTreeSet<String>>) -> Vec<String> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let mut expansions: Vec<String> = Vec::new();
    let mut add = |raw: &str| {
        let candidate = normalize_query(raw);
        if candidate.is_empty() || expansions.contains(&candidate) {
            return;
        }
        if world_objects.is_some_and(|w| !w.contains(&candidate)) {
            return;
        }
        expansions.push(candidate);
    };

    if let Some((x, y)) = extract_x_no_y_pattern(query) {
        add(&x);
        if char_len(&y) <= MAX_QUERY_LENGTH {
            add(&y);
        }
        if let Some((nested, _)) = extract_x_no_y_pattern(&y) {
            add(&nested);
        }
    }

    for object in extract_action_object(query) {
        add(&object);
    }

    let normalized = normalize_query(query);
    if char_len(&normalized) <= MAX_QUERY_LENGTH {
        add(&normalized);
    }

    expansions
}

/// Best suggestion for `query`, never auto-adopted.
///
/// With `use_expansion`, each expansion that is a world member is tried and
/// the highest-scoring top candidate wins; the raw query is used when nothing
/// expands. Returns `None` when no candidate reaches `threshold`.
pub fn suggest_match(
    query: &str,
    world_objects: &BTreeSet<String>,
    threshold: f64,
    use_expansion: bool,
    backend: SimilarityBackend,
) -> Result<Option<(String, f64)>> {
    let matcher = FuzzyMatcher::with_backend(MatcherConfig::suggest_only(threshold), backend)?;

    let mut queries = vec![query.to_string()];
    if use_expansion {
        let expanded = expand_queries(query, Some(world_objects));
        if !expanded.is_empty() {
            queries = expanded;
        }
    }

    let mut best: Option<(String, f64)> = None;
    for q in &queries {
        let result = matcher.match_query(q, world_objects);
        let Some(top) = result.top() else {
            continue;
        };
        let beats = best.as_ref().map_or(true, |(_, score)| top.score() > *score);
        if beats && top.score() >= threshold {
            best = Some((top.name().to_string(), top.score()));
        }
    }
    Ok(best)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

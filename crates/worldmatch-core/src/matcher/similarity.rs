//! String-similarity backends.
//!
//! Both backends score in `[0.0, 1.0]` over Unicode scalar values, so they
//! behave the same for kana/kanji as for ASCII. `Indel` is the default: the
//! threshold grid is calibrated on its ratio of matching characters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Similarity function used to rank world objects against a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBackend {
    /// Normalised Levenshtein distance (`strsim`). Opt-in; scores run lower
    /// than `Indel` for the same pair.
    #[cfg(feature = "strsim")]
    Levenshtein,
    /// `2 * LCS / (|a| + |b|)`: matching characters under insert/delete edits.
    Indel,
}

impl SimilarityBackend {
    /// Backend selected by `auto`.
    pub fn detect() -> Self {
        Self::Indel
    }

    /// Every backend compiled into this build.
    pub fn available() -> &'static [SimilarityBackend] {
        &[
            #[cfg(feature = "strsim")]
            Self::Levenshtein,
            Self::Indel,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            #[cfg(feature = "strsim")]
            Self::Levenshtein => "levenshtein",
            Self::Indel => "indel",
        }
    }

    /// Similarity of `a` and `b`, clamped to `[0.0, 1.0]`.
    pub fn score(self, a: &str, b: &str) -> f64 {
        let raw = match self {
            #[cfg(feature = "strsim")]
            Self::Levenshtein => strsim::normalized_levenshtein(a, b),
            Self::Indel => indel_ratio(a, b),
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }
}

impl Default for SimilarityBackend {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Display for SimilarityBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityBackend {
    type Err = String;

    /// Accepts `auto`, `indel`, and `levenshtein` (when compiled in).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::detect()),
            "indel" => Ok(Self::Indel),
            #[cfg(feature = "strsim")]
            "levenshtein" => Ok(Self::Levenshtein),
            other => Err(format!(
                "unknown similarity backend '{}' (expected one of: auto, {})",
                other,
                Self::available()
                    .iter()
                    .map(|b| b.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// Indel similarity: `2 * LCS / (|a| + |b|)`. Two empty strings score 1.0.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, two-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

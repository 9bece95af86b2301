//! TOML configuration.
//!
//! ```toml
//! [matcher]
//! auto_adopt_threshold = 0.9
//! suggest_threshold = 0.7
//! allow_auto_adopt = false
//! max_candidates = 5
//! backend = "auto"
//!
//! [eval]
//! threshold_grid = [0.7, 0.75, 0.8, 0.85, 0.9]
//! results_dir = "results"
//! pattern = "gm_*"
//! format = "both"
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Result, WorldmatchError};
use crate::eval::{EvalConfig, DEFAULT_THRESHOLD_GRID};
use crate::extract::DEFAULT_RUN_PATTERN;
use crate::matcher::similarity::SimilarityBackend;
use crate::matcher::MatcherConfig;
use crate::reporting::ReportFormat;

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "worldmatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldmatchConfig {
    #[serde(default)]
    pub matcher: MatcherSection,
    #[serde(default)]
    pub eval: EvalSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSection {
    pub auto_adopt_threshold: f64,
    pub suggest_threshold: f64,
    pub allow_auto_adopt: bool,
    pub max_candidates: usize,
    /// `auto`, `levenshtein` or `indel`.
    pub backend: String,
}

impl Default for MatcherSection {
    fn default() -> Self {
        let defaults = MatcherConfig::default();
        Self {
            auto_adopt_threshold: defaults.auto_adopt_threshold,
            suggest_threshold: defaults.suggest_threshold,
            allow_auto_adopt: defaults.allow_auto_adopt,
            max_candidates: defaults.max_candidates,
            backend: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSection {
    pub threshold_grid: Vec<f64>,
    pub results_dir: PathBuf,
    pub pattern: String,
    pub format: ReportFormat,
}

impl Default for EvalSection {
    fn default() -> Self {
        Self {
            threshold_grid: DEFAULT_THRESHOLD_GRID.to_vec(),
            results_dir: PathBuf::from("results"),
            pattern: DEFAULT_RUN_PATTERN.to_string(),
            format: ReportFormat::Both,
        }
    }
}

impl WorldmatchConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `./worldmatch.toml` is used
    /// when present, else the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !local.exists() {
                    tracing::debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
                local
            }
        };

        let contents = fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse and validate.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.matcher_config().validate()?;
        self.eval_config()?.validate()
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            auto_adopt_threshold: self.matcher.auto_adopt_threshold,
            suggest_threshold: self.matcher.suggest_threshold,
            allow_auto_adopt: self.matcher.allow_auto_adopt,
            max_candidates: self.matcher.max_candidates,
        }
    }

    pub fn backend(&self) -> Result<SimilarityBackend> {
        self.matcher
            .backend
            .parse()
            .map_err(WorldmatchError::InvalidConfig)
    }

    pub fn eval_config(&self) -> Result<EvalConfig> {
        Ok(EvalConfig {
            threshold_grid: self.eval.threshold_grid.clone(),
            backend: self.backend()?,
            max_candidates: self.matcher.max_candidates,
        })
    }
}

//! Analysis configuration
//!
//! Loaded from TOML, YAML or JSON; the format is picked from the file
//! extension. Every key is optional.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::classifier::{PatternId, PatternRule, Severity};
use crate::error::{GapError, Result};

/// Default verification-loop budget
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Taxonomy adjustments applied on top of the built-in rule table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaxonomyConfig {
    /// Pattern ids removed from the table
    pub disabled: Vec<PatternId>,
    /// Pattern ids moved to the front, in this order
    pub order: Vec<PatternId>,
    /// Severity pinned per pattern
    pub severity: BTreeMap<PatternId, Severity>,
    /// Additional patterns appended after the built-in ones
    pub extra: Vec<PatternRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Verification iterations allowed before the loop aborts
    pub max_iterations: usize,
    /// Lowest severity that makes an analysis fail
    pub fail_on: Severity,
    /// Overrides the `|components| + 1` fixed-point cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixpoint_cap: Option<usize>,
    pub taxonomy: TaxonomyConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fail_on: Severity::Low,
            fixpoint_cap: None,
            taxonomy: TaxonomyConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse a configuration, picking the format from a file extension
    pub fn parse(extension: &str, content: &str) -> Result<Self> {
        let config: AnalysisConfig = match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(content)?,
            "yaml" | "yml" => serde_yaml::from_str(content)?,
            "toml" => toml::from_str(content)?,
            other => {
                return Err(GapError::config(format!(
                    "Unsupported config format: {}. Supported formats: json, yaml, yml, toml",
                    other
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GapError::config(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Self::parse(extension, &content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(GapError::config("max_iterations must be at least 1"));
        }
        if self.fixpoint_cap == Some(0) {
            return Err(GapError::config("fixpoint_cap must be at least 1"));
        }
        Ok(())
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_fixpoint_cap(mut self, cap: usize) -> Self {
        self.fixpoint_cap = Some(cap);
        self
    }
}

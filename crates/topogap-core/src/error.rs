//! Error types for the analysis engine
//!
//! Fatal conditions abort the current pass and surface as [`GapError`].
//! Conditions the engine recovers from locally are described by
//! [`RecoveredKind`] and travel inside reports instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for analysis operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GapError {
    /// Malformed topology input or a broken model invariant
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// The availability fixed point kept growing past its iteration cap
    #[error("Cycle divergence: availability still growing after {iterations} iterations (cap {cap})")]
    CycleDivergence { iterations: usize, cap: usize },

    /// The verification loop ran out of iterations before reaching COMPLETE
    #[error("Iteration budget exhausted: no COMPLETE verification within {max_iterations} iteration(s)")]
    IterationBudgetExhausted { max_iterations: usize },

    /// A session phase was requested out of order
    #[error("Phase order: {0}")]
    PhaseOrder(String),

    /// Invalid analysis configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Document parsing error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl GapError {
    /// Create a schema violation
    pub fn schema(msg: impl Into<String>) -> Self {
        GapError::SchemaViolation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        GapError::Config(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        GapError::Parse(msg.into())
    }

    /// Check if this error was caused by the caller's input (vs an engine fault)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            GapError::SchemaViolation(_) | GapError::Config(_) | GapError::Parse(_)
        )
    }
}

impl From<serde_json::Error> for GapError {
    fn from(err: serde_json::Error) -> Self {
        GapError::Parse(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for GapError {
    fn from(err: serde_yaml::Error) -> Self {
        GapError::Parse(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for GapError {
    fn from(err: toml::de::Error) -> Self {
        GapError::Parse(format!("TOML error: {}", err))
    }
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, GapError>;

/// Conditions that degrade to a reported classification rather than an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveredKind {
    /// No rule in the pattern table matched a gap
    ClassificationAmbiguity,
    /// A fix's dependents or owner could not be determined with confidence
    DeliberationUncertain,
}

impl fmt::Display for RecoveredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveredKind::ClassificationAmbiguity => write!(f, "classification_ambiguity"),
            RecoveredKind::DeliberationUncertain => write!(f, "deliberation_uncertain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GapError::schema("transition references unknown component 'x'");
        assert_eq!(
            err.to_string(),
            "Schema violation: transition references unknown component 'x'"
        );

        let err = GapError::CycleDivergence { iterations: 4, cap: 4 };
        assert!(err.to_string().contains("cap 4"));
    }

    #[test]
    fn test_is_user_error() {
        assert!(GapError::schema("bad").is_user_error());
        assert!(GapError::parse("bad").is_user_error());
        assert!(!GapError::CycleDivergence { iterations: 1, cap: 1 }.is_user_error());
        assert!(!GapError::IterationBudgetExhausted { max_iterations: 3 }.is_user_error());
    }

    #[test]
    fn test_from_yaml_error() {
        let err: GapError = serde_yaml::from_str::<Vec<u8>>("{ not: [a list").unwrap_err().into();
        assert!(matches!(err, GapError::Parse(_)));
    }

    #[test]
    fn test_recovered_kind_display() {
        assert_eq!(
            RecoveredKind::ClassificationAmbiguity.to_string(),
            "classification_ambiguity"
        );
        assert_eq!(
            RecoveredKind::DeliberationUncertain.to_string(),
            "deliberation_uncertain"
        );
    }
}

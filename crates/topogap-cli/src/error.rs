//! Error types for the topogap driver
//!
//! Wraps engine errors together with the I/O and rendering failures the
//! driver adds, and maps each onto a process exit code.

use thiserror::Error;
use topogap_core::GapError;

use crate::cli::ExitCode;

/// Main error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Error raised by the analysis engine
    #[error(transparent)]
    Analysis(#[from] GapError),

    /// Missing or unreadable input path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid arguments or input files
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Report rendering error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Create an invalid path error
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        CliError::InvalidPath(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        match self {
            CliError::Analysis(err) => err.is_user_error(),
            CliError::InvalidPath(_) | CliError::InvalidInput(_) | CliError::Io(_) => true,
            CliError::Serialization(_) | CliError::Internal(_) => false,
        }
    }

    /// Exit code reported for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Analysis(GapError::SchemaViolation(_)) => ExitCode::SchemaViolation,
            CliError::Analysis(GapError::CycleDivergence { .. }) => ExitCode::CycleDivergence,
            CliError::Analysis(GapError::IterationBudgetExhausted { .. }) => {
                ExitCode::BudgetExhausted
            }
            CliError::Analysis(GapError::Config(_)) | CliError::Analysis(GapError::Parse(_)) => {
                ExitCode::InvalidInput
            }
            CliError::Analysis(GapError::PhaseOrder(_)) => ExitCode::InternalError,
            CliError::InvalidPath(_) | CliError::Io(_) => ExitCode::InvalidPath,
            CliError::InvalidInput(_) => ExitCode::InvalidInput,
            CliError::Serialization(_) | CliError::Internal(_) => ExitCode::InternalError,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        CliError::Serialization(err.to_string())
    }
}

//! CLI module for topogap
//!
//! Command definitions, report rendering and the exit-code contract of the
//! `topogap` binary.

pub mod commands;
pub mod output;

pub use commands::{GapCli, GapCommands};
pub use output::{OutputFormat, VerificationRound, VerificationRun};

use topogap_core::{DeliberatedFixSet, VerificationStatus};

use crate::error::CliError;
use crate::ingest;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command succeeded with nothing left to address
    Success = 0,
    /// Gaps at or above the failure threshold remain
    UnresolvedGaps = 1,
    /// At least one fix was FLAGGED for an external decision
    FixesDeferred = 2,
    /// Invalid arguments, configuration or fix files
    InvalidInput = 3,
    /// Input path missing or unreadable
    InvalidPath = 4,
    /// Topology document violates the model schema
    SchemaViolation = 5,
    /// Availability did not converge within the fixed-point cap
    CycleDivergence = 6,
    /// Verification did not complete within the iteration budget
    BudgetExhausted = 7,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Exit code for an analysis with `blocking` gaps at or above the threshold
    pub fn from_gap_count(blocking: usize) -> Self {
        if blocking == 0 {
            ExitCode::Success
        } else {
            ExitCode::UnresolvedGaps
        }
    }

    pub fn from_deliberation(set: &DeliberatedFixSet) -> Self {
        if set.has_flagged() {
            ExitCode::FixesDeferred
        } else {
            ExitCode::Success
        }
    }

    pub fn from_status(status: VerificationStatus) -> Self {
        match status {
            VerificationStatus::Complete => ExitCode::Success,
            VerificationStatus::NeedsIteration => ExitCode::UnresolvedGaps,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub async fn run(cli: GapCli) -> Result<ExitCode, CliError> {
    let config = ingest::load_config(cli.config.as_deref(), cli.max_iterations).await?;

    match cli.command {
        GapCommands::Analyze {
            path,
            fail_on,
            format,
        } => commands::execute_analyze(path, fail_on, format, &config).await,
        GapCommands::Deliberate {
            path,
            fixes,
            format,
        } => commands::execute_deliberate(path, fixes, format, &config).await,
        GapCommands::Verify {
            path,
            baseline,
            fixes,
            format,
        } => commands::execute_verify(path, baseline, fixes, format, &config).await,
        GapCommands::Taxonomy { format } => commands::execute_taxonomy(format, &config),
    }
}

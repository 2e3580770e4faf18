//! Topogap CLI
//!
//! Driver for the topogap analysis engine: loads topology documents (single
//! files or directories of fragments), runs analysis sessions and renders
//! reports.
//!
//! # Usage
//!
//! ```bash
//! # Gap report for a topology, failing on HIGH and above
//! topogap analyze pipeline.yaml --fail-on high
//!
//! # Deliberate proposed fixes
//! topogap deliberate pipeline.yaml --fixes fixes.yaml --format json
//!
//! # Run two fix rounds and verify each
//! topogap verify pipeline/ --fixes round1.yaml --fixes round2.yaml
//!
//! # Diff a saved report against a re-extracted topology
//! topogap analyze pipeline.yaml --format json > before.json
//! topogap verify pipeline.yaml --baseline before.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Unresolved gaps at or above the failure threshold
//! - 2: Fixes deferred (FLAGGED)
//! - 3: Invalid input or configuration
//! - 4: Invalid path
//! - 5: Schema violation
//! - 6: Cycle divergence
//! - 7: Iteration budget exhausted
//! - 10: Internal error

pub mod cli;
pub mod error;
pub mod ingest;
pub mod logging;

pub use cli::{ExitCode, GapCli, GapCommands, OutputFormat};
pub use error::CliError;

/// Run the CLI application
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use topogap_cli::{run_cli, GapCli};
///
/// #[tokio::main]
/// async fn main() {
///     let cli = GapCli::parse();
///     let exit_code = run_cli(cli).await;
///     std::process::exit(exit_code.into());
/// }
/// ```
pub async fn run_cli(cli: GapCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(user_error = e.is_user_error(), "Command failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

//! CLI command definitions for topogap
//!
//! Provides Clap-based commands for analyzing a topology, deliberating a set
//! of proposed fixes, verifying fix rounds and printing the pattern taxonomy.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use topogap_core::{
    AnalysisConfig, Analyzer, DeliberatedFixSet, GapReport, RuleTable, Session, Severity,
    VerificationLoop,
};

use super::output::{render, OutputFormat, VerificationRound, VerificationRun};
use super::ExitCode;
use crate::error::CliError;
use crate::ingest;
use crate::logging::LogFormat;

/// Contract-gap analysis for multi-component pipelines
///
/// Finds where components lack the data or capabilities they require,
/// classifies each gap, and checks proposed fixes against the whole graph.
#[derive(Parser, Debug)]
#[command(name = "topogap")]
#[command(about = "Contract-gap analysis for multi-component pipeline topologies", long_about = None)]
#[command(version)]
pub struct GapCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Analysis configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "TOPOGAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verification iterations allowed before giving up
    #[arg(long, global = true, env = "TOPOGAP_MAX_ITERATIONS")]
    pub max_iterations: Option<usize>,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: GapCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum GapCommands {
    /// Produce the gap report for a topology
    ///
    /// PATH is a topology document or a directory of document fragments.
    Analyze {
        /// Topology document or directory
        path: PathBuf,

        /// Lowest severity that fails the run (overrides `fail_on`)
        #[arg(long)]
        fail_on: Option<Severity>,

        /// Output format for the report
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// Deliberate proposed fixes against the whole topology
    Deliberate {
        /// Topology document or directory
        path: PathBuf,

        /// Fix list (JSON, YAML or TOML)
        #[arg(long)]
        fixes: PathBuf,

        /// Output format for the verdicts
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// Verify that applied fixes closed their gaps
    ///
    /// With --baseline, diffs a saved gap report against the topology at
    /// PATH. With --fixes, runs one deliberate, apply and verify round per
    /// fix file, in order, stopping once verification is complete.
    Verify {
        /// Topology document or directory
        path: PathBuf,

        /// Gap report saved from `analyze --format json`
        #[arg(long, conflicts_with = "fixes", required_unless_present = "fixes")]
        baseline: Option<PathBuf>,

        /// Fix list for one round; repeat for further rounds
        #[arg(long)]
        fixes: Vec<PathBuf>,

        /// Output format for the verification rounds
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },

    /// Print the effective pattern taxonomy
    Taxonomy {
        /// Output format for the rule table
        #[arg(long, value_enum, default_value = "table")]
        format: Option<OutputFormat>,
    },
}

/// Scan and analyze `path` in a fresh session
async fn start_session(
    path: &Path,
    config: &AnalysisConfig,
) -> Result<(Session, GapReport), CliError> {
    let topology = ingest::load_topology(path).await?;
    let mut session = Session::new(config)?;
    session.scan(topology)?;
    let report = session.analyze()?.payload;
    Ok((session, report))
}

/// Gap report for the topology at `path`
pub async fn analyze(path: &Path, config: &AnalysisConfig) -> Result<GapReport, CliError> {
    let (_, report) = start_session(path, config).await?;
    Ok(report)
}

/// Execute the analyze command
pub async fn execute_analyze(
    path: PathBuf,
    fail_on: Option<Severity>,
    format: Option<OutputFormat>,
    config: &AnalysisConfig,
) -> Result<ExitCode, CliError> {
    let report = analyze(&path, config).await?;
    render("analyze", &report, format.unwrap_or_default())?;

    let threshold = fail_on.unwrap_or(config.fail_on);
    let blocking = report.blocking(threshold).count();
    info!(gaps = report.gaps.len(), blocking, %threshold, "Analysis finished");
    Ok(ExitCode::from_gap_count(blocking))
}

/// Verdicts for the fixes in `fixes` against the topology at `path`
pub async fn deliberate(
    path: &Path,
    fixes: &Path,
    config: &AnalysisConfig,
) -> Result<DeliberatedFixSet, CliError> {
    let fixes = ingest::load_fixes(fixes).await?;
    let (mut session, _) = start_session(path, config).await?;
    Ok(session.deliberate(&fixes)?.payload)
}

/// Execute the deliberate command
pub async fn execute_deliberate(
    path: PathBuf,
    fixes: PathBuf,
    format: Option<OutputFormat>,
    config: &AnalysisConfig,
) -> Result<ExitCode, CliError> {
    let set = deliberate(&path, &fixes, config).await?;
    render("deliberate", &set, format.unwrap_or_default())?;
    Ok(ExitCode::from_deliberation(&set))
}

/// Verification rounds for the topology at `path`
pub async fn verify(
    path: &Path,
    baseline: Option<&Path>,
    fixes: &[PathBuf],
    config: &AnalysisConfig,
) -> Result<VerificationRun, CliError> {
    match (baseline, fixes.is_empty()) {
        (Some(baseline), true) => {
            let baseline = ingest::load_baseline(baseline).await?;
            let topology = ingest::load_topology(path).await?;
            let analyzer = Analyzer::from_config(config)?;
            let mut verification =
                VerificationLoop::new(analyzer, baseline, config.max_iterations);
            let report = verification.verify(&topology)?;
            Ok(VerificationRun {
                rounds: vec![VerificationRound {
                    deliberation: None,
                    report,
                }],
            })
        }
        (None, false) => {
            let (mut session, _) = start_session(path, config).await?;
            let mut rounds = Vec::with_capacity(fixes.len());
            for fix_file in fixes {
                let proposed = ingest::load_fixes(fix_file).await?;
                let deliberation = session.deliberate(&proposed)?.payload;
                let plan = session.apply()?.payload;
                let report = session.verify(plan.projected)?.payload;
                let complete = report.is_complete();
                rounds.push(VerificationRound {
                    deliberation: Some(deliberation),
                    report,
                });
                if complete {
                    break;
                }
            }
            Ok(VerificationRun { rounds })
        }
        _ => Err(CliError::invalid_input(
            "verify takes either --baseline or one or more --fixes files",
        )),
    }
}

/// Execute the verify command
pub async fn execute_verify(
    path: PathBuf,
    baseline: Option<PathBuf>,
    fixes: Vec<PathBuf>,
    format: Option<OutputFormat>,
    config: &AnalysisConfig,
) -> Result<ExitCode, CliError> {
    let run = verify(&path, baseline.as_deref(), &fixes, config).await?;
    render("verify", &run, format.unwrap_or_default())?;
    Ok(ExitCode::from_status(run.status()))
}

/// Execute the taxonomy command
pub fn execute_taxonomy(
    format: Option<OutputFormat>,
    config: &AnalysisConfig,
) -> Result<ExitCode, CliError> {
    let table = RuleTable::from_config(&config.taxonomy)?;
    render("taxonomy", &table, format.unwrap_or_default())?;
    Ok(ExitCode::Success)
}

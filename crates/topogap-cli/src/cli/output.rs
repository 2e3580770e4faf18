//! Output formatting for the topogap CLI
//!
//! Reports render as JSON or YAML wrapped in a run envelope, or as a
//! human-readable table with severity and verdict coloring. The envelope
//! carries run metadata only; report digests never include it.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use uuid::Uuid;

use topogap_core::{
    DeliberatedFixSet, DeliberationVerdict, Gap, GapReport, RuleTable, Severity, Verdict,
    VerificationReport, VerificationStatus,
};

use crate::error::CliError;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

/// Run metadata wrapped around a machine-readable result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub result: T,
}

impl<T> Envelope<T> {
    pub fn new(command: &str, result: T) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            command: command.to_string(),
            result,
        }
    }
}

/// One deliberate, apply and verify round of the `verify` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliberation: Option<DeliberatedFixSet>,
    pub report: VerificationReport,
}

/// Result of the `verify` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRun {
    pub rounds: Vec<VerificationRound>,
}

impl VerificationRun {
    /// Status of the last round; an empty run has nothing left to close
    pub fn status(&self) -> VerificationStatus {
        self.rounds
            .last()
            .map(|r| r.report.status)
            .unwrap_or(VerificationStatus::Complete)
    }
}

/// Human-readable rendering
pub trait TableView {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Render `value` to stdout
pub fn render<T: Serialize + TableView>(
    command: &str,
    value: &T,
    format: OutputFormat,
) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    render_to(&mut out, command, value, format)
}

/// Render `value` to any writer
pub fn render_to<W: Write, T: Serialize + TableView>(
    out: &mut W,
    command: &str,
    value: &T,
    format: OutputFormat,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &Envelope::new(command, value))?;
            writeln!(out)?;
        }
        OutputFormat::Yaml => {
            serde_yaml::to_writer(&mut *out, &Envelope::new(command, value))?;
        }
        OutputFormat::Table => value.write_table(out)?,
    }
    Ok(())
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.blue(),
    }
}

fn verdict_label(verdict: Verdict) -> ColoredString {
    let label = verdict.to_string();
    match verdict {
        Verdict::Proceed => label.green(),
        Verdict::Redesigned => label.yellow(),
        Verdict::Flagged => label.red().bold(),
    }
}

fn status_label(status: VerificationStatus) -> ColoredString {
    match status {
        VerificationStatus::Complete => status.to_string().green().bold(),
        VerificationStatus::NeedsIteration => status.to_string().yellow().bold(),
    }
}

fn heading(out: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", title.cyan().bold())?;
    writeln!(out, "{}", "=".repeat(60))
}

fn write_gap(out: &mut dyn Write, gap: &Gap) -> io::Result<()> {
    let missing: Vec<String> = gap.missing.iter().map(|s| s.to_string()).collect();
    writeln!(
        out,
        "  [{}] {}  {}",
        severity_label(gap.severity),
        gap.transition,
        gap.pattern.to_string().magenta()
    )?;
    writeln!(out, "      missing: {}", missing.join(", "))?;
    if let Some(cycle) = &gap.cycle {
        let members: Vec<&str> = cycle.iter().map(|c| c.as_str()).collect();
        writeln!(out, "      cycle:   {}", members.join(", "))?;
    }
    if let Some(recovered) = gap.recovered {
        writeln!(out, "      {}", recovered.to_string().dimmed())?;
    }
    Ok(())
}

fn write_gap_section(out: &mut dyn Write, title: &str, gaps: &[Gap]) -> io::Result<()> {
    if gaps.is_empty() {
        return Ok(());
    }
    writeln!(out, "{} ({})", title.cyan().bold(), gaps.len())?;
    writeln!(out, "{}", "-".repeat(60))?;
    for gap in gaps {
        write_gap(out, gap)?;
    }
    writeln!(out)
}

impl TableView for GapReport {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "Gap Report")?;
        writeln!(out, "Topology: {}", self.topology_fingerprint.dimmed())?;
        writeln!(out)?;

        if self.is_clean() {
            writeln!(out, "{} No contract gaps found", "+".green())?;
            return Ok(());
        }

        let summary: Vec<String> = [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ]
        .into_iter()
        .filter(|s| self.count_at(*s) > 0)
        .map(|s| format!("{} {}", self.count_at(s), severity_label(s)))
        .collect();
        writeln!(
            out,
            "{} {} gap(s): {}",
            "x".red(),
            self.gaps.len(),
            summary.join(", ")
        )?;
        writeln!(out)?;
        write_gap_section(out, "Gaps", &self.gaps)?;
        writeln!(out, "Digest: {}", self.digest().dimmed())
    }
}

fn write_verdict(out: &mut dyn Write, index: usize, verdict: &DeliberationVerdict) -> io::Result<()> {
    writeln!(
        out,
        "  {}. [{}] {}",
        index + 1,
        verdict_label(verdict.verdict),
        verdict.fix
    )?;
    writeln!(out, "      {}", verdict.detail)?;
    if let Some(relocation) = &verdict.relocation {
        writeln!(out, "      {} {}", "→".yellow(), relocation)?;
    }
    if !verdict.candidates.is_empty() {
        let candidates: Vec<&str> = verdict.candidates.iter().map(|c| c.as_str()).collect();
        writeln!(out, "      candidates: {}", candidates.join(", "))?;
    }
    Ok(())
}

impl TableView for DeliberatedFixSet {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "Deliberated Fixes")?;
        writeln!(
            out,
            "{} proceed, {} redesigned, {} flagged",
            self.count(Verdict::Proceed).to_string().green(),
            self.count(Verdict::Redesigned).to_string().yellow(),
            self.count(Verdict::Flagged).to_string().red()
        )?;
        writeln!(out, "{}", "-".repeat(60))?;
        for (index, verdict) in self.verdicts.iter().enumerate() {
            write_verdict(out, index, verdict)?;
        }
        writeln!(out)
    }
}

impl TableView for VerificationReport {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "Iteration {}: {}  ({} closed, {} remaining, {} introduced)",
            self.iteration,
            status_label(self.status),
            self.closed.len(),
            self.remaining.len(),
            self.introduced.len()
        )?;
        writeln!(out)?;
        write_gap_section(out, "Closed", &self.closed)?;
        write_gap_section(out, "Remaining", &self.remaining)?;
        write_gap_section(out, "Introduced", &self.introduced)
    }
}

impl TableView for VerificationRun {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "Verification")?;
        for round in &self.rounds {
            if let Some(set) = &round.deliberation {
                for (index, verdict) in set.verdicts.iter().enumerate() {
                    write_verdict(out, index, verdict)?;
                }
                writeln!(out)?;
            }
            round.report.write_table(out)?;
        }
        writeln!(out, "Status: {}", status_label(self.status()))
    }
}

impl TableView for RuleTable {
    fn write_table(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "Pattern Taxonomy")?;
        if self.is_empty() {
            writeln!(
                out,
                "{} every pattern is disabled; gaps will be UNCLASSIFIED",
                "!".yellow()
            )?;
            return Ok(());
        }
        for (index, rule) in self.rules().iter().enumerate() {
            let severity = rule
                .severity
                .map(|s| severity_label(s).to_string())
                .unwrap_or_else(|| "ranked".dimmed().to_string());
            writeln!(
                out,
                "  {:>2}. {} [{}]",
                index + 1,
                rule.id.as_str().bold(),
                severity
            )?;
            writeln!(out, "      {}: {}", rule.name, rule.description)?;
        }
        writeln!(out)
    }
}

//! Verification Loop
//!
//! Re-analyzes a freshly ingested topology after fixes were applied and
//! diffs the result against the previous run. Gaps are compared one missing
//! subject at a time, so a partially closed gap shows up in both `closed`
//! and `remaining`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

use crate::analysis::Analyzer;
use crate::classifier::{Gap, GapReport};
use crate::error::{GapError, Result};
use crate::model::{ComponentId, Subject, Topology, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Complete,
    NeedsIteration,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Complete => write!(f, "COMPLETE"),
            VerificationStatus::NeedsIteration => write!(f, "NEEDS_ITERATION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// 1-based loop iteration that produced this report
    pub iteration: usize,
    pub closed: Vec<Gap>,
    pub remaining: Vec<Gap>,
    pub introduced: Vec<Gap>,
    pub status: VerificationStatus,
}

impl VerificationReport {
    pub fn is_complete(&self) -> bool {
        self.status == VerificationStatus::Complete
    }

    /// `remaining ∪ introduced`, the input of the next deliberation round
    pub fn outstanding(&self) -> Vec<Gap> {
        let mut gaps: Vec<Gap> = self
            .remaining
            .iter()
            .chain(self.introduced.iter())
            .cloned()
            .collect();
        gaps.sort_by(|a, b| a.scope().cmp(&b.scope()));
        gaps
    }
}

type Scope = (Transition, Option<BTreeSet<ComponentId>>);

fn atoms(report: &GapReport) -> BTreeMap<(Scope, Subject), &Gap> {
    report
        .gaps
        .iter()
        .flat_map(|gap| {
            gap.missing.iter().map(move |subject| {
                (
                    ((gap.transition.clone(), gap.cycle.clone()), subject.clone()),
                    gap,
                )
            })
        })
        .collect()
}

/// Regroup atoms into gap records, keeping the metadata of the record each came from
fn regroup<'a>(atoms: impl Iterator<Item = (&'a (Scope, Subject), &'a &'a Gap)>) -> Vec<Gap> {
    let mut grouped: BTreeMap<&'a Scope, Gap> = BTreeMap::new();
    for ((scope, subject), source) in atoms {
        grouped
            .entry(scope)
            .or_insert_with(|| Gap {
                missing: BTreeSet::new(),
                ..(*source).clone()
            })
            .missing
            .insert(subject.clone());
    }
    grouped.into_values().collect()
}

/// `closed = G₀ − G₁`, `remaining = G₀ ∩ G₁`, `introduced = G₁ − G₀`
pub fn diff(before: &GapReport, after: &GapReport, iteration: usize) -> VerificationReport {
    let old = atoms(before);
    let new = atoms(after);

    let closed = regroup(old.iter().filter(|(key, _)| !new.contains_key(*key)));
    let remaining = regroup(new.iter().filter(|(key, _)| old.contains_key(*key)));
    let introduced = regroup(new.iter().filter(|(key, _)| !old.contains_key(*key)));

    let status = if remaining.is_empty() && introduced.is_empty() {
        VerificationStatus::Complete
    } else {
        VerificationStatus::NeedsIteration
    };

    VerificationReport {
        iteration,
        closed,
        remaining,
        introduced,
        status,
    }
}

/// Bounded re-analysis loop
#[derive(Debug, Clone)]
pub struct VerificationLoop {
    analyzer: Analyzer,
    baseline: GapReport,
    max_iterations: usize,
    iteration: usize,
    last: Option<VerificationReport>,
}

impl VerificationLoop {
    pub fn new(analyzer: Analyzer, baseline: GapReport, max_iterations: usize) -> Self {
        Self {
            analyzer,
            baseline,
            max_iterations,
            iteration: 0,
            last: None,
        }
    }

    /// Analyze `topology`, diff it against the baseline and make it the new
    /// baseline. Fails with `SchemaViolation` on a model that breaks an
    /// invariant and with `IterationBudgetExhausted` once `max_iterations`
    /// verifications have run.
    pub fn verify(&mut self, topology: &Topology) -> Result<VerificationReport> {
        topology.validate()?;
        if self.iteration >= self.max_iterations {
            warn!(max_iterations = self.max_iterations, "Verification budget exhausted");
            return Err(GapError::IterationBudgetExhausted {
                max_iterations: self.max_iterations,
            });
        }
        self.iteration += 1;

        let current = self.analyzer.analyze(topology)?;
        let report = diff(&self.baseline, &current, self.iteration);

        info!(
            iteration = self.iteration,
            closed = report.closed.len(),
            remaining = report.remaining.len(),
            introduced = report.introduced.len(),
            status = %report.status,
            "Verification pass"
        );

        self.baseline = current;
        self.last = Some(report.clone());
        Ok(report)
    }

    /// Gaps still to deliberate: the baseline before the first verification,
    /// `remaining ∪ introduced` afterwards
    pub fn outstanding(&self) -> Vec<Gap> {
        match &self.last {
            Some(report) => report.outstanding(),
            None => self.baseline.gaps.clone(),
        }
    }

    pub fn baseline(&self) -> &GapReport {
        &self.baseline
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn remaining_budget(&self) -> usize {
        self.max_iterations.saturating_sub(self.iteration)
    }

    pub fn last_report(&self) -> Option<&VerificationReport> {
        self.last.as_ref()
    }
}

//! Analysis session
//!
//! Walks the phases `SCAN → ANALYZE → DELIBERATE → APPLY → VERIFY`, handing a
//! [`Checkpoint`] back to the driver after each one. The driver decides
//! whether to continue, retry or abort; after VERIFY it may start another
//! DELIBERATE round on the outstanding gaps.
//!
//! The session keeps no model across APPLY: the accepted fixes are handed
//! out together with their in-memory projection, and VERIFY takes whatever
//! model the driver ingests afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::analysis::Analyzer;
use crate::classifier::{Gap, GapReport};
use crate::config::AnalysisConfig;
use crate::deliberation::{DeliberatedFixSet, DeliberationEngine};
use crate::error::{GapError, Result};
use crate::model::{Fix, Topology};
use crate::verification::{VerificationLoop, VerificationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Scan,
    Analyze,
    Deliberate,
    Apply,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Scan => "SCAN",
            Phase::Analyze => "ANALYZE",
            Phase::Deliberate => "DELIBERATE",
            Phase::Apply => "APPLY",
            Phase::Verify => "VERIFY",
        };
        f.write_str(name)
    }
}

/// Result object returned at a phase boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint<T> {
    pub phase: Phase,
    /// Deliberation round, starting at 1
    pub round: usize,
    pub payload: T,
}

/// Snapshot facts recorded at SCAN
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub components: usize,
    pub transitions: usize,
    pub cycles: usize,
    pub fingerprint: String,
}

/// Fixes cleared for the Applier and the model they would produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPlan {
    pub fixes: Vec<Fix>,
    pub projected: Topology,
}

#[derive(Debug)]
pub struct Session {
    analyzer: Analyzer,
    engine: DeliberationEngine,
    max_iterations: usize,
    last: Option<Phase>,
    round: usize,
    snapshot: Option<Topology>,
    deliberated: Option<DeliberatedFixSet>,
    verification: Option<VerificationLoop>,
}

impl Session {
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            analyzer: Analyzer::from_config(config)?,
            engine: DeliberationEngine::new(),
            max_iterations: config.max_iterations,
            last: None,
            round: 0,
            snapshot: None,
            deliberated: None,
            verification: None,
        })
    }

    /// Last completed phase
    pub fn phase(&self) -> Option<Phase> {
        self.last
    }

    fn ensure_after(&self, requested: Phase, allowed: &[Option<Phase>]) -> Result<()> {
        if allowed.contains(&self.last) {
            return Ok(());
        }
        let after = self
            .last
            .map(|p| p.to_string())
            .unwrap_or_else(|| "nothing".to_string());
        Err(GapError::PhaseOrder(format!(
            "{} cannot follow {}",
            requested, after
        )))
    }

    fn checkpoint<T>(&mut self, phase: Phase, payload: T) -> Checkpoint<T> {
        self.last = Some(phase);
        info!(%phase, round = self.round, "Phase complete");
        Checkpoint {
            phase,
            round: self.round,
            payload,
        }
    }

    /// Take the Extractor's model as the snapshot for this session
    pub fn scan(&mut self, topology: Topology) -> Result<Checkpoint<ScanSummary>> {
        self.ensure_after(Phase::Scan, &[None])?;
        topology.validate()?;

        let summary = ScanSummary {
            components: topology.components().len(),
            transitions: topology.transitions().len(),
            cycles: topology.cycles().len(),
            fingerprint: topology.fingerprint(),
        };
        self.snapshot = Some(topology);
        Ok(self.checkpoint(Phase::Scan, summary))
    }

    pub fn analyze(&mut self) -> Result<Checkpoint<GapReport>> {
        self.ensure_after(Phase::Analyze, &[Some(Phase::Scan)])?;
        let topology = self.snapshot()?;
        let report = self.analyzer.analyze(topology)?;

        self.verification = Some(VerificationLoop::new(
            self.analyzer.clone(),
            report.clone(),
            self.max_iterations,
        ));
        Ok(self.checkpoint(Phase::Analyze, report))
    }

    pub fn deliberate(&mut self, fixes: &[Fix]) -> Result<Checkpoint<DeliberatedFixSet>> {
        self.ensure_after(
            Phase::Deliberate,
            &[Some(Phase::Analyze), Some(Phase::Verify)],
        )?;
        let set = self.engine.deliberate(self.snapshot()?, fixes)?;
        self.round += 1;
        self.deliberated = Some(set.clone());
        Ok(self.checkpoint(Phase::Deliberate, set))
    }

    /// Release the accepted fixes and drop the model snapshot
    pub fn apply(&mut self) -> Result<Checkpoint<ApplyPlan>> {
        self.ensure_after(Phase::Apply, &[Some(Phase::Deliberate)])?;
        let fixes = self
            .deliberated
            .take()
            .map(|set| set.accepted())
            .unwrap_or_default();
        let projected = self.snapshot()?.revised(&fixes)?;
        self.snapshot = None;
        Ok(self.checkpoint(Phase::Apply, ApplyPlan { fixes, projected }))
    }

    /// Verify a freshly ingested model; it becomes the snapshot for the next round
    pub fn verify(&mut self, topology: Topology) -> Result<Checkpoint<VerificationReport>> {
        self.ensure_after(Phase::Verify, &[Some(Phase::Apply)])?;
        let verification = self
            .verification
            .as_mut()
            .ok_or_else(|| GapError::PhaseOrder("VERIFY before ANALYZE".to_string()))?;
        let report = verification.verify(&topology)?;
        self.snapshot = Some(topology);
        Ok(self.checkpoint(Phase::Verify, report))
    }

    /// Gaps the next deliberation round should address
    pub fn outstanding(&self) -> Vec<Gap> {
        self.verification
            .as_ref()
            .map(VerificationLoop::outstanding)
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Result<&Topology> {
        self.snapshot
            .as_ref()
            .ok_or_else(|| GapError::PhaseOrder("no topology snapshot is held".to_string()))
    }
}

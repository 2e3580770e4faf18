//! Deliberation Engine
//!
//! Evaluates proposed fixes against the whole graph before anything is
//! applied. Each fix moves `PROPOSED → EVALUATING → {PROCEED | REDESIGNED |
//! FLAGGED}`:
//!
//! - removals check who else depends on the subject and, when someone does,
//!   are rewritten into a relocation towards the owner of those dependents;
//! - additions and relocations only have to keep the passthrough/writes
//!   invariant intact;
//! - anything the engine cannot decide with confidence is FLAGGED with the
//!   candidates it considered, leaving the choice to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

use crate::error::{GapError, RecoveredKind, Result};
use crate::model::{
    Component, ComponentId, Confidence, ContractSlot, Fix, FixAction, FixTarget, Subject,
    Topology,
};

/// Outcome of deliberating one fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Safe to apply as proposed
    Proceed,
    /// Replaced by a relocation fix
    Redesigned,
    /// Deferred to the external decision-maker
    Flagged,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Proceed => write!(f, "PROCEED"),
            Verdict::Redesigned => write!(f, "REDESIGNED"),
            Verdict::Flagged => write!(f, "FLAGGED"),
        }
    }
}

/// Lifecycle of a fix under deliberation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliberationState {
    Proposed,
    Evaluating,
    Decided(Verdict),
}

impl DeliberationState {
    fn advance(self, decided: Option<Verdict>) -> Result<Self> {
        match (self, decided) {
            (DeliberationState::Proposed, None) => Ok(DeliberationState::Evaluating),
            (DeliberationState::Evaluating, Some(verdict)) => Ok(DeliberationState::Decided(verdict)),
            (state, _) => Err(GapError::PhaseOrder(format!(
                "deliberation cannot advance from {:?}",
                state
            ))),
        }
    }
}

/// A fix together with the engine's decision on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliberationVerdict {
    pub fix: Fix,
    pub verdict: Verdict,
    pub detail: String,
    /// Replacement fix for REDESIGNED verdicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relocation: Option<Fix>,
    /// Owners considered for FLAGGED verdicts
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub candidates: BTreeSet<ComponentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered: Option<RecoveredKind>,
}

impl DeliberationVerdict {
    fn proceed(fix: &Fix, detail: impl Into<String>) -> Self {
        Self {
            fix: fix.clone(),
            verdict: Verdict::Proceed,
            detail: detail.into(),
            relocation: None,
            candidates: BTreeSet::new(),
            recovered: None,
        }
    }

    fn flagged(fix: &Fix, detail: impl Into<String>, candidates: BTreeSet<ComponentId>) -> Self {
        Self {
            fix: fix.clone(),
            verdict: Verdict::Flagged,
            detail: detail.into(),
            relocation: None,
            candidates,
            recovered: Some(RecoveredKind::DeliberationUncertain),
        }
    }

    fn redesigned(fix: &Fix, relocation: Fix, detail: impl Into<String>) -> Self {
        Self {
            fix: fix.clone(),
            verdict: Verdict::Redesigned,
            detail: detail.into(),
            relocation: Some(relocation),
            candidates: BTreeSet::new(),
            recovered: None,
        }
    }

    /// Relocation target of a REDESIGNED verdict
    pub fn relocation_target(&self) -> Option<&ComponentId> {
        match self.relocation.as_ref().map(|f| &f.action) {
            Some(FixAction::Relocate { to }) => Some(to),
            _ => None,
        }
    }

    /// The fix an Applier should realize, if any
    pub fn accepted_fix(&self) -> Option<&Fix> {
        match self.verdict {
            Verdict::Proceed => Some(&self.fix),
            Verdict::Redesigned => self.relocation.as_ref(),
            Verdict::Flagged => None,
        }
    }
}

/// Verdicts for a batch of proposed fixes, in proposal order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliberatedFixSet {
    pub verdicts: Vec<DeliberationVerdict>,
}

impl DeliberatedFixSet {
    /// Fixes cleared for application: PROCEED fixes as proposed, REDESIGNED
    /// ones as their relocation
    pub fn accepted(&self) -> Vec<Fix> {
        self.verdicts
            .iter()
            .filter_map(DeliberationVerdict::accepted_fix)
            .cloned()
            .collect()
    }

    pub fn flagged(&self) -> impl Iterator<Item = &DeliberationVerdict> {
        self.verdicts.iter().filter(|v| v.verdict == Verdict::Flagged)
    }

    pub fn has_flagged(&self) -> bool {
        self.flagged().next().is_some()
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.verdicts.iter().filter(|v| v.verdict == verdict).count()
    }
}

/// Whole-graph fix evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliberationEngine;

impl DeliberationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Deliberate every fix against the same topology snapshot
    pub fn deliberate(&self, topology: &Topology, fixes: &[Fix]) -> Result<DeliberatedFixSet> {
        let verdicts = fixes
            .iter()
            .map(|fix| self.deliberate_fix(topology, fix))
            .collect::<Result<Vec<_>>>()?;
        let set = DeliberatedFixSet { verdicts };

        info!(
            fixes = fixes.len(),
            proceed = set.count(Verdict::Proceed),
            redesigned = set.count(Verdict::Redesigned),
            flagged = set.count(Verdict::Flagged),
            "Deliberation complete"
        );
        Ok(set)
    }

    /// Deliberate a single fix.
    ///
    /// Fails with `SchemaViolation` when the fix references an unknown
    /// component or transition, or when a relocation the engine produced
    /// would itself break a model invariant.
    pub fn deliberate_fix(&self, topology: &Topology, fix: &Fix) -> Result<DeliberationVerdict> {
        let mut state = DeliberationState::Proposed;
        check_references(topology, fix)?;

        state = state.advance(None)?;
        debug!(fix = %fix, ?state, "Evaluating fix");

        let verdict = evaluate(topology, fix)?;

        state = state.advance(Some(verdict.verdict))?;
        debug!(fix = %fix, ?state, detail = %verdict.detail, "Fix decided");
        Ok(verdict)
    }
}

fn check_references(topology: &Topology, fix: &Fix) -> Result<()> {
    match &fix.target {
        FixTarget::Component(id) => {
            known(topology, id)?;
        }
        FixTarget::Transition(transition) => {
            if !topology.has_transition(transition) {
                return Err(GapError::schema(format!(
                    "fix targets unknown transition {}",
                    transition
                )));
            }
        }
    }
    if let FixAction::Relocate { to } = &fix.action {
        known(topology, to)?;
    }
    Ok(())
}

fn known<'t>(topology: &'t Topology, id: &ComponentId) -> Result<&'t Component> {
    topology
        .component(id)
        .ok_or_else(|| GapError::schema(format!("fix references unknown component '{}'", id)))
}

fn evaluate(topology: &Topology, fix: &Fix) -> Result<DeliberationVerdict> {
    if !fix.is_well_formed() {
        let detail = match (&fix.target, &fix.subject) {
            (FixTarget::Transition(_), Subject::Capability(_)) => {
                "capabilities do not travel along transitions".to_string()
            }
            _ => format!("{} cannot hold {}", fix.effective_slot(), fix.subject),
        };
        return Ok(DeliberationVerdict::flagged(fix, detail, BTreeSet::new()));
    }

    match fix.action {
        FixAction::Add | FixAction::Relocate { .. } => Ok(match topology.revised(std::slice::from_ref(fix)) {
            Ok(_) => DeliberationVerdict::proceed(fix, "contract edit keeps the model consistent"),
            Err(GapError::SchemaViolation(reason)) => DeliberationVerdict::flagged(fix, reason, BTreeSet::new()),
            Err(other) => return Err(other),
        }),
        FixAction::Remove => evaluate_removal(topology, fix),
    }
}

fn evaluate_removal(topology: &Topology, fix: &Fix) -> Result<DeliberationVerdict> {
    let slot = fix.effective_slot();
    let source = known(topology, fix.target.component())?;

    if slot.is_requirement() {
        return Ok(DeliberationVerdict::proceed(
            fix,
            "narrowing a requirement only affects the component itself",
        ));
    }
    if !holds(source, slot, &fix.subject) {
        return Ok(DeliberationVerdict::proceed(
            fix,
            format!("{} does not hold {} in {}", source.id, fix.subject, slot),
        ));
    }

    let dependents = dependents(topology, &source.id, &fix.subject);
    if dependents.is_empty() {
        let unknown = unclear_observers(topology, &source.id, &fix.subject);
        if !unknown.is_empty() {
            return Ok(DeliberationVerdict::flagged(
                fix,
                "components with undetermined contracts may depend on the subject",
                unknown,
            ));
        }
        return Ok(DeliberationVerdict::proceed(fix, "no other component requires the subject"));
    }

    let candidates = owner_candidates(topology, &source.id, &fix.subject, &dependents, slot);
    debug!(
        fix = %fix,
        dependents = dependents.len(),
        candidates = candidates.len(),
        "Owner candidates"
    );

    let mut owners = candidates.iter();
    let owner = match (owners.next(), owners.next()) {
        (Some(owner), None) => owner,
        (None, _) => {
            return Ok(DeliberationVerdict::flagged(
                fix,
                "subject is required elsewhere but no component can own it",
                dependents,
            ))
        }
        (Some(_), Some(_)) => {
            return Ok(DeliberationVerdict::flagged(
                fix,
                "several components could own the subject",
                candidates,
            ))
        }
    };

    if topology.component(owner).map(|c| c.confidence) != Some(Confidence::Declared) {
        return Ok(DeliberationVerdict::flagged(
            fix,
            format!("owner {} has an inferred contract", owner),
            candidates,
        ));
    }

    let relocation = Fix::relocate(source.id.as_str(), owner.as_str(), fix.subject.clone())
        .in_slot(slot)
        .with_rationale(format!(
            "{} is still required by {}",
            fix.subject,
            dependents
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));

    topology.revised(std::slice::from_ref(&relocation)).map_err(|e| {
        GapError::schema(format!("relocation '{}' breaks the model: {}", relocation, e))
    })?;

    Ok(DeliberationVerdict::redesigned(
        fix,
        relocation,
        format!("relocated to {}", owner),
    ))
}

fn holds(component: &Component, slot: ContractSlot, subject: &Subject) -> bool {
    match (slot, subject) {
        (ContractSlot::Writes, Subject::Field(f)) => component.writes.contains(f),
        (ContractSlot::Passthrough, Subject::Field(f)) => component.passthrough.contains(f),
        (ContractSlot::Reads, Subject::Field(f)) => component.reads.contains(f),
        (ContractSlot::Capabilities, Subject::Capability(c)) => component.capabilities.contains(c),
        (ContractSlot::Invokes, Subject::Capability(c)) => component.invokes.contains(c),
        _ => false,
    }
}

/// Components other than `source` that still need `subject` from it
///
/// Fields are only visible downstream, so field dependents are descendants
/// requiring the field. Capabilities are needed wherever they are invoked.
fn dependents(topology: &Topology, source: &ComponentId, subject: &Subject) -> BTreeSet<ComponentId> {
    let pool: BTreeSet<ComponentId> = match subject {
        Subject::Field(_) => topology.descendants(source),
        Subject::Capability(_) => topology.components().keys().cloned().collect(),
    };
    pool.into_iter()
        .filter(|id| id != source)
        .filter(|id| topology.required(id).contains(subject))
        .collect()
}

/// UNCLEAR components that could depend on `subject` without saying so
fn unclear_observers(
    topology: &Topology,
    source: &ComponentId,
    subject: &Subject,
) -> BTreeSet<ComponentId> {
    let pool: BTreeSet<ComponentId> = match subject {
        Subject::Field(_) => topology.descendants(source),
        Subject::Capability(_) => topology.components().keys().cloned().collect(),
    };
    pool.into_iter()
        .filter(|id| id != source)
        .filter(|id| topology.component(id).map_or(false, Component::is_unclear))
        .collect()
}

/// Components that could take over `subject` for all dependents
fn owner_candidates(
    topology: &Topology,
    source: &ComponentId,
    subject: &Subject,
    dependents: &BTreeSet<ComponentId>,
    slot: ContractSlot,
) -> BTreeSet<ComponentId> {
    let plausible: BTreeSet<ComponentId> = match subject {
        Subject::Capability(_) => dependents.clone(),
        Subject::Field(_) => {
            let covering: BTreeSet<ComponentId> = topology
                .components()
                .values()
                .filter(|c| &c.id != source && !c.is_unclear())
                // a dependent never receives what it writes itself
                .filter(|c| !dependents.contains(&c.id))
                .filter(|c| dependents.iter().all(|d| topology.ancestors(d).contains(&c.id)))
                .map(|c| c.id.clone())
                .collect();
            lowest(topology, &covering)
        }
    };

    plausible
        .into_iter()
        .filter(|id| {
            topology
                .component(id)
                .map_or(false, |c| keeps_invariant(c, slot, subject))
        })
        .collect()
}

/// Members of `set` with no other member strictly downstream of them
fn lowest(topology: &Topology, set: &BTreeSet<ComponentId>) -> BTreeSet<ComponentId> {
    set.iter()
        .filter(|k| {
            let below = topology.descendants(k);
            !set.iter().any(|other| {
                other != *k && below.contains(other) && !topology.descendants(other).contains(*k)
            })
        })
        .cloned()
        .collect()
}

fn keeps_invariant(component: &Component, slot: ContractSlot, subject: &Subject) -> bool {
    match (slot, subject) {
        (ContractSlot::Writes, Subject::Field(f)) => !component.passthrough.contains(f),
        (ContractSlot::Passthrough, Subject::Field(f)) => !component.writes.contains(f),
        _ => true,
    }
}

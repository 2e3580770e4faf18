//! Contract Matcher
//!
//! Computes, per transition, the set of subjects the target requires but
//! cannot obtain. Cardinal fields travel transitively through a bounded
//! fixed point; non-cardinal fields are visible only from the immediate
//! predecessor; capabilities never travel and are available only to the
//! component holding them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::{GapError, Result};
use crate::model::{ComponentId, FieldId, Subject, Topology, Transition};

/// Required-but-unavailable subjects on one transition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractGap {
    pub transition: Transition,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub missing: BTreeSet<Subject>,
}

/// Converged cardinal-field inflow per component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    inflow: BTreeMap<ComponentId, BTreeSet<FieldId>>,
    iterations: usize,
}

impl Availability {
    /// Fields arriving at a component from all of its predecessors
    pub fn inflow(&self, id: &ComponentId) -> Option<&BTreeSet<FieldId>> {
        self.inflow.get(id)
    }

    /// Number of fixed-point rounds until no set grew
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// `available(A→B) = (inflow(B) ∩ cardinal) ∪ writes(A) ∪ passthrough(A) ∪ capabilities(B)`
    ///
    /// An UNCLEAR source contributes nothing of its own.
    pub fn available_on(&self, topology: &Topology, transition: &Transition) -> BTreeSet<Subject> {
        let mut available: BTreeSet<Subject> = self
            .inflow
            .get(&transition.to)
            .into_iter()
            .flatten()
            .filter(|f| topology.is_cardinal(f))
            .cloned()
            .map(Subject::Field)
            .collect();

        if let Some(source) = topology.component(&transition.from) {
            if !source.is_unclear() {
                available.extend(source.emits().cloned().map(Subject::Field));
            }
        }
        if let Some(target) = topology.component(&transition.to) {
            available.extend(target.capabilities.iter().cloned().map(Subject::Capability));
        }

        available
    }
}

/// Result of one matcher pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub availability: Availability,
    /// Non-empty gaps, ordered by transition
    pub gaps: Vec<ContractGap>,
}

impl MatchOutcome {
    pub fn gap_on(&self, transition: &Transition) -> Option<&ContractGap> {
        self.gaps.iter().find(|g| &g.transition == transition)
    }
}

/// Fixed-point contract matcher
#[derive(Debug, Clone, Default)]
pub struct ContractMatcher {
    fixpoint_cap: Option<usize>,
}

impl ContractMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the `|components| + 1` iteration cap
    pub fn with_fixpoint_cap(mut self, cap: usize) -> Self {
        self.fixpoint_cap = Some(cap);
        self
    }

    /// Effective iteration cap for a topology
    pub fn cap_for(&self, topology: &Topology) -> usize {
        self.fixpoint_cap
            .unwrap_or_else(|| topology.components().len() + 1)
    }

    /// Run the cardinal-field fixed point.
    ///
    /// Every round recomputes all inflow sets from the previous round's sets,
    /// so the result never depends on component or transition order. Fails
    /// with `CycleDivergence` if sets are still growing once the cap is spent.
    pub fn availability(&self, topology: &Topology) -> Result<Availability> {
        let cap = self.cap_for(topology);
        let cardinal = topology.cardinal_fields();

        let mut inflow: BTreeMap<ComponentId, BTreeSet<FieldId>> = topology
            .components()
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        let mut iterations = 0;

        loop {
            if iterations >= cap {
                warn!(iterations, cap, "Availability fixed point did not stabilize");
                return Err(GapError::CycleDivergence { iterations, cap });
            }
            iterations += 1;

            let next: BTreeMap<ComponentId, BTreeSet<FieldId>> = inflow
                .keys()
                .map(|id| {
                    let arriving: BTreeSet<FieldId> = topology
                        .predecessors(id)
                        .iter()
                        .flat_map(|p| outflow(topology, &inflow, &cardinal, p))
                        .collect();
                    (id.clone(), arriving)
                })
                .collect();

            if next == inflow {
                break;
            }
            inflow = next;
        }

        debug!(iterations, cap, "Availability fixed point converged");
        Ok(Availability { inflow, iterations })
    }

    /// `required(B) − available(A→B)` for every transition
    pub fn match_topology(&self, topology: &Topology) -> Result<MatchOutcome> {
        let availability = self.availability(topology)?;

        let gaps: Vec<ContractGap> = topology
            .transitions()
            .iter()
            .filter_map(|transition| {
                let required = topology.required(&transition.to);
                if required.is_empty() {
                    return None;
                }
                let available = availability.available_on(topology, transition);
                let missing: BTreeSet<Subject> =
                    required.difference(&available).cloned().collect();
                if missing.is_empty() {
                    None
                } else {
                    debug!(%transition, missing = missing.len(), "Contract gap");
                    Some(ContractGap {
                        transition: transition.clone(),
                        missing,
                    })
                }
            })
            .collect();

        Ok(MatchOutcome { availability, gaps })
    }
}

/// `out(P) = writes(P) ∪ passthrough(P) ∪ (inflow(P) ∩ cardinal)`; empty for UNCLEAR `P`
fn outflow(
    topology: &Topology,
    inflow: &BTreeMap<ComponentId, BTreeSet<FieldId>>,
    cardinal: &BTreeSet<FieldId>,
    id: &ComponentId,
) -> BTreeSet<FieldId> {
    let Some(component) = topology.component(id) else {
        return BTreeSet::new();
    };
    if component.is_unclear() {
        return BTreeSet::new();
    }

    let mut out: BTreeSet<FieldId> = component.emits().cloned().collect();
    if let Some(arrived) = inflow.get(id) {
        out.extend(arrived.intersection(cardinal).cloned());
    }
    out
}

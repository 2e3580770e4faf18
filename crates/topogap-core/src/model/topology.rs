//! The topology graph
//!
//! A directed graph of components that may contain cycles. All traversals
//! are visited-set guarded and every collection is ordered, so queries are
//! independent of insertion order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::OnceLock;

use super::{
    Capability, CapabilityId, CapabilityKind, Component, ComponentId, Field, FieldId, Role,
    Subject, Transition,
};
use crate::error::{GapError, Result};

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:/-]*$").expect("identifier pattern is valid")
    })
}

/// Components, fields, capabilities and transitions of one pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    fields: BTreeMap<FieldId, Field>,
    capabilities: BTreeMap<CapabilityId, Capability>,
    components: BTreeMap<ComponentId, Component>,
    transitions: BTreeSet<Transition>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if self.fields.contains_key(&field.id) {
            return Err(GapError::schema(format!("duplicate field '{}'", field.id)));
        }
        self.fields.insert(field.id.clone(), field);
        Ok(())
    }

    /// Declare a capability
    pub fn add_capability(&mut self, capability: Capability) -> Result<()> {
        if self.capabilities.contains_key(&capability.id) {
            return Err(GapError::schema(format!(
                "duplicate capability '{}'",
                capability.id
            )));
        }
        self.capabilities.insert(capability.id.clone(), capability);
        Ok(())
    }

    /// Add a component
    pub fn add_component(&mut self, component: Component) -> Result<()> {
        if self.components.contains_key(&component.id) {
            return Err(GapError::schema(format!(
                "duplicate component '{}'",
                component.id
            )));
        }
        self.components.insert(component.id.clone(), component);
        Ok(())
    }

    /// Add a transition; endpoints are checked by [`Topology::validate`]
    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.insert(transition);
    }

    /// Builder-style [`Topology::add_field`]
    pub fn with_field(mut self, field: Field) -> Result<Self> {
        self.add_field(field)?;
        Ok(self)
    }

    /// Builder-style [`Topology::add_component`]
    pub fn with_component(mut self, component: Component) -> Result<Self> {
        self.add_component(component)?;
        Ok(self)
    }

    /// Builder-style [`Topology::add_transition`]
    pub fn with_transition(mut self, from: &str, to: &str) -> Self {
        self.add_transition(Transition::new(from, to));
        self
    }

    /// Check the model invariants.
    ///
    /// Fails with `SchemaViolation` when an identifier is malformed, a
    /// transition references an unknown component, a contract references an
    /// undeclared field, or a component's passthrough overlaps its writes.
    pub fn validate(&self) -> Result<()> {
        let pattern = identifier_pattern();

        for id in self.fields.keys() {
            if !pattern.is_match(id.as_str()) {
                return Err(GapError::schema(format!("malformed field id '{}'", id)));
            }
        }
        for id in self.capabilities.keys() {
            if !pattern.is_match(id.as_str()) {
                return Err(GapError::schema(format!("malformed capability id '{}'", id)));
            }
        }

        for component in self.components.values() {
            if !pattern.is_match(component.id.as_str()) {
                return Err(GapError::schema(format!(
                    "malformed component id '{}'",
                    component.id
                )));
            }

            let referenced = component
                .reads
                .iter()
                .chain(component.writes.iter())
                .chain(component.passthrough.iter());
            for field in referenced {
                if !self.fields.contains_key(field) {
                    return Err(GapError::schema(format!(
                        "component '{}' references undeclared field '{}'",
                        component.id, field
                    )));
                }
            }

            for capability in component.capabilities.iter().chain(component.invokes.iter()) {
                if !pattern.is_match(capability.as_str()) {
                    return Err(GapError::schema(format!(
                        "component '{}' references malformed capability id '{}'",
                        component.id, capability
                    )));
                }
            }

            if let Some(field) = component.passthrough.intersection(&component.writes).next() {
                return Err(GapError::schema(format!(
                    "component '{}' both writes and passes through field '{}'",
                    component.id, field
                )));
            }
        }

        for transition in &self.transitions {
            for endpoint in [&transition.from, &transition.to] {
                if !self.components.contains_key(endpoint) {
                    return Err(GapError::schema(format!(
                        "transition {} references unknown component '{}'",
                        transition, endpoint
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn fields(&self) -> &BTreeMap<FieldId, Field> {
        &self.fields
    }

    pub fn capabilities(&self) -> &BTreeMap<CapabilityId, Capability> {
        &self.capabilities
    }

    pub fn components(&self) -> &BTreeMap<ComponentId, Component> {
        &self.components
    }

    pub fn transitions(&self) -> &BTreeSet<Transition> {
        &self.transitions
    }

    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    pub(crate) fn component_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id)
    }

    pub fn has_transition(&self, transition: &Transition) -> bool {
        self.transitions.contains(transition)
    }

    /// Whether a field is declared cardinal
    pub fn is_cardinal(&self, field: &FieldId) -> bool {
        self.fields.get(field).map(|f| f.cardinal).unwrap_or(false)
    }

    /// All cardinal field ids
    pub fn cardinal_fields(&self) -> BTreeSet<FieldId> {
        self.fields
            .values()
            .filter(|f| f.cardinal)
            .map(|f| f.id.clone())
            .collect()
    }

    /// Kind of a capability; undeclared capabilities count as actions
    pub fn capability_kind(&self, id: &CapabilityId) -> CapabilityKind {
        self.capabilities
            .get(id)
            .map(|c| c.kind)
            .unwrap_or_default()
    }

    /// `required(B)`; empty for unknown or UNCLEAR components
    pub fn required(&self, id: &ComponentId) -> BTreeSet<Subject> {
        self.components
            .get(id)
            .map(Component::required)
            .unwrap_or_default()
    }

    /// Whether a component feeds a validation or grounding step
    pub fn is_validation_bearing(&self, id: &ComponentId) -> bool {
        let Some(component) = self.components.get(id) else {
            return false;
        };
        component.role == Role::Validator
            || component
                .capabilities
                .iter()
                .chain(component.invokes.iter())
                .any(|c| self.capability_kind(c).is_validating())
    }

    /// Immediate predecessors of a component
    pub fn predecessors(&self, id: &ComponentId) -> BTreeSet<ComponentId> {
        self.transitions
            .iter()
            .filter(|t| &t.to == id)
            .map(|t| t.from.clone())
            .collect()
    }

    /// Immediate successors of a component
    pub fn successors(&self, id: &ComponentId) -> BTreeSet<ComponentId> {
        self.transitions
            .iter()
            .filter(|t| &t.from == id)
            .map(|t| t.to.clone())
            .collect()
    }

    /// Every component with a path to `id`. Contains `id` itself only when
    /// `id` lies on a cycle.
    pub fn ancestors(&self, id: &ComponentId) -> BTreeSet<ComponentId> {
        self.reach(id, |node| self.predecessors(node))
    }

    /// Every component reachable from `id`. Contains `id` itself only when
    /// `id` lies on a cycle.
    pub fn descendants(&self, id: &ComponentId) -> BTreeSet<ComponentId> {
        self.reach(id, |node| self.successors(node))
    }

    fn reach<F>(&self, start: &ComponentId, next: F) -> BTreeSet<ComponentId>
    where
        F: Fn(&ComponentId) -> BTreeSet<ComponentId>,
    {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<ComponentId> = next(start).into_iter().collect();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.clone()) {
                continue;
            }
            for neighbour in next(&node) {
                if !visited.contains(&neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }

        visited
    }

    /// Strongly connected components that contain at least one cycle,
    /// ordered by their smallest member.
    pub fn cycles(&self) -> Vec<BTreeSet<ComponentId>> {
        let mut assigned: BTreeSet<ComponentId> = BTreeSet::new();
        let mut cycles = Vec::new();

        for id in self.components.keys() {
            if assigned.contains(id) {
                continue;
            }
            let descendants = self.descendants(id);
            if !descendants.contains(id) {
                continue;
            }
            let ancestors = self.ancestors(id);
            let members: BTreeSet<ComponentId> =
                descendants.intersection(&ancestors).cloned().collect();
            assigned.extend(members.iter().cloned());
            cycles.push(members);
        }

        cycles
    }

    /// Cycles whose members can only be fed by each other: no clear
    /// component upstream of the cycle writes or passes through a field any
    /// member reads. In-edges that supply nothing the members read do not
    /// open a cycle.
    pub fn closed_cycles(&self) -> Vec<BTreeSet<ComponentId>> {
        self.cycles()
            .into_iter()
            .filter(|members| {
                let supplied: BTreeSet<&FieldId> = members
                    .iter()
                    .flat_map(|m| self.ancestors(m))
                    .filter(|a| !members.contains(a))
                    .filter_map(|a| self.components.get(&a))
                    .filter(|c| !c.is_unclear())
                    .flat_map(|c| c.emits())
                    .collect();
                members
                    .iter()
                    .filter_map(|m| self.components.get(m))
                    .all(|c| c.reads.iter().all(|f| !supplied.contains(f)))
            })
            .collect()
    }

    /// Components (other than UNCLEAR ones) that write or pass through a field
    pub fn producers(&self, field: &FieldId) -> BTreeSet<ComponentId> {
        self.components
            .values()
            .filter(|c| !c.is_unclear())
            .filter(|c| c.writes.contains(field) || c.passthrough.contains(field))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Components (other than UNCLEAR ones) holding a capability
    pub fn holders(&self, capability: &CapabilityId) -> BTreeSet<ComponentId> {
        self.components
            .values()
            .filter(|c| !c.is_unclear())
            .filter(|c| c.capabilities.contains(capability))
            .map(|c| c.id.clone())
            .collect()
    }

    /// Deterministic SHA-256 fingerprint of the model
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        if let Ok(json) = serde_json::to_string(self) {
            hasher.update(json.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

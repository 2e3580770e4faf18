//! Proposed remediations

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ComponentId, Subject, Transition};

/// What a fix is aimed at
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixTarget {
    Component(ComponentId),
    /// Forwarding across a transition; edits the source component's passthrough
    Transition(Transition),
}

impl FixTarget {
    /// The component whose contract the fix edits
    pub fn component(&self) -> &ComponentId {
        match self {
            FixTarget::Component(id) => id,
            FixTarget::Transition(t) => &t.from,
        }
    }
}

impl fmt::Display for FixTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixTarget::Component(id) => write!(f, "{}", id),
            FixTarget::Transition(t) => write!(f, "{}", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    Remove,
    Add,
    /// Move the subject from the target component to `to`, same slot
    Relocate { to: ComponentId },
}

impl fmt::Display for FixAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixAction::Remove => write!(f, "REMOVE"),
            FixAction::Add => write!(f, "ADD"),
            FixAction::Relocate { to } => write!(f, "RELOCATE(to={})", to),
        }
    }
}

/// Which contract set of a component a fix edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSlot {
    Reads,
    Writes,
    Passthrough,
    Capabilities,
    Invokes,
}

impl ContractSlot {
    /// Whether the slot holds fields (vs capabilities)
    pub fn holds_fields(&self) -> bool {
        matches!(
            self,
            ContractSlot::Reads | ContractSlot::Writes | ContractSlot::Passthrough
        )
    }

    /// Slots that only narrow what the component itself needs
    pub fn is_requirement(&self) -> bool {
        matches!(self, ContractSlot::Reads | ContractSlot::Invokes)
    }
}

impl fmt::Display for ContractSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractSlot::Reads => "reads",
            ContractSlot::Writes => "writes",
            ContractSlot::Passthrough => "passthrough",
            ContractSlot::Capabilities => "capabilities",
            ContractSlot::Invokes => "invokes",
        };
        f.write_str(name)
    }
}

/// A proposed remediation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fix {
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub target: FixTarget,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub action: FixAction,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub subject: Subject,
    /// Contract set to edit; see [`Fix::effective_slot`] for the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<ContractSlot>,
    #[serde(default)]
    pub rationale: String,
}

impl Fix {
    pub fn new(target: FixTarget, action: FixAction, subject: Subject) -> Self {
        Self {
            target,
            action,
            subject,
            slot: None,
            rationale: String::new(),
        }
    }

    /// REMOVE `subject` from a component
    pub fn remove(component: impl Into<String>, subject: Subject) -> Self {
        Self::new(
            FixTarget::Component(ComponentId::new(component)),
            FixAction::Remove,
            subject,
        )
    }

    /// ADD `subject` to a component
    pub fn add(component: impl Into<String>, subject: Subject) -> Self {
        Self::new(
            FixTarget::Component(ComponentId::new(component)),
            FixAction::Add,
            subject,
        )
    }

    /// RELOCATE `subject` from one component to another
    pub fn relocate(from: impl Into<String>, to: impl Into<String>, subject: Subject) -> Self {
        Self::new(
            FixTarget::Component(ComponentId::new(from)),
            FixAction::Relocate {
                to: ComponentId::new(to),
            },
            subject,
        )
    }

    pub fn in_slot(mut self, slot: ContractSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Explicit slot, else passthrough for transition targets, writes for
    /// fields and capabilities for capabilities
    pub fn effective_slot(&self) -> ContractSlot {
        if let Some(slot) = self.slot {
            return slot;
        }
        match (&self.target, &self.subject) {
            (FixTarget::Transition(_), _) => ContractSlot::Passthrough,
            (FixTarget::Component(_), Subject::Field(_)) => ContractSlot::Writes,
            (FixTarget::Component(_), Subject::Capability(_)) => ContractSlot::Capabilities,
        }
    }

    /// Whether subject kind and slot kind agree
    pub fn is_well_formed(&self) -> bool {
        let slot = self.effective_slot();
        match (&self.target, &self.subject) {
            (FixTarget::Transition(_), Subject::Capability(_)) => false,
            (FixTarget::Transition(_), Subject::Field(_)) => slot == ContractSlot::Passthrough,
            (FixTarget::Component(_), subject) => slot.holds_fields() == subject.is_field(),
        }
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {}.{}",
            self.action,
            self.subject,
            self.target,
            self.effective_slot()
        )
    }
}

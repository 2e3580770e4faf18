//! Topology model
//!
//! Components, their read/write/passthrough/capability contracts, and the
//! directed transitions between them. The model is built once per analysis
//! pass and treated as an immutable snapshot; revisions produce a new
//! [`Topology`] instead of editing the old one.

pub mod document;
pub mod fix;
pub mod revision;
pub mod topology;

pub use document::{
    CapabilityDecl, ComponentDecl, FieldDecl, TopologyDocument, TransitionDecl,
};
pub use fix::{ContractSlot, Fix, FixAction, FixTarget};
pub use topology::Topology;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier text
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

identifier!(
    /// Identifier of a component in the topology
    ComponentId
);
identifier!(
    /// Identifier of a data field
    FieldId
);
identifier!(
    /// Identifier of a capability (tool or permission); distinct namespace from fields
    CapabilityId
);

/// Something a component can require: a field or a capability
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Field(FieldId),
    Capability(CapabilityId),
}

impl Subject {
    /// Field subject shorthand
    pub fn field(id: impl Into<String>) -> Self {
        Subject::Field(FieldId::new(id))
    }

    /// Capability subject shorthand
    pub fn capability(id: impl Into<String>) -> Self {
        Subject::Capability(CapabilityId::new(id))
    }

    pub fn as_field(&self) -> Option<&FieldId> {
        match self {
            Subject::Field(id) => Some(id),
            Subject::Capability(_) => None,
        }
    }

    pub fn as_capability(&self) -> Option<&CapabilityId> {
        match self {
            Subject::Capability(id) => Some(id),
            Subject::Field(_) => None,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, Subject::Field(_))
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, Subject::Capability(_))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Field(id) => write!(f, "field:{}", id),
            Subject::Capability(id) => write!(f, "capability:{}", id),
        }
    }
}

/// A data field flowing between components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub name: String,
    /// Cardinal fields must persist through every transition they cross
    pub cardinal: bool,
}

impl Field {
    pub fn new(id: impl Into<String>, cardinal: bool) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: FieldId::new(id),
            cardinal,
        }
    }

    /// Set the human-readable name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// What a capability is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    /// Checks produced content against a reference
    Validation,
    /// Anchors content to external ground truth
    Grounding,
    /// Fetches data
    Retrieval,
    /// Any other side-effecting tool or permission
    #[default]
    Action,
}

impl CapabilityKind {
    /// Whether the capability checks or anchors content
    pub fn is_validating(&self) -> bool {
        matches!(self, CapabilityKind::Validation | CapabilityKind::Grounding)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Validation => write!(f, "validation"),
            CapabilityKind::Grounding => write!(f, "grounding"),
            CapabilityKind::Retrieval => write!(f, "retrieval"),
            CapabilityKind::Action => write!(f, "action"),
        }
    }
}

/// A declared capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub name: String,
    pub kind: CapabilityKind,
}

impl Capability {
    pub fn new(id: impl Into<String>, kind: CapabilityKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: CapabilityId::new(id),
            kind,
        }
    }
}

/// Role tag of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Gatekeeper,
    Retriever,
    Generator,
    Validator,
    Router,
    Orchestrator,
    Tool,
    #[serde(other)]
    Other,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Gatekeeper => "gatekeeper",
            Role::Retriever => "retriever",
            Role::Generator => "generator",
            Role::Validator => "validator",
            Role::Router => "router",
            Role::Orchestrator => "orchestrator",
            Role::Tool => "tool",
            Role::Other => "other",
        };
        f.write_str(name)
    }
}

/// How confidently the Extractor determined a component's contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Contract declared explicitly in the source
    #[default]
    Declared,
    /// Contract inferred from soft-typed sources
    Inferred,
    /// Role or contract could not be determined
    Unclear,
}

/// A pipeline component and its declared contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: ComponentId,
    pub role: Role,
    pub reads: BTreeSet<FieldId>,
    pub writes: BTreeSet<FieldId>,
    /// Fields received unchanged and forwarded; disjoint from `writes`
    pub passthrough: BTreeSet<FieldId>,
    /// Capabilities this component holds
    pub capabilities: BTreeSet<CapabilityId>,
    /// Capabilities this component's declared checks need
    pub invokes: BTreeSet<CapabilityId>,
    pub confidence: Confidence,
}

impl Component {
    /// Create a component with empty contracts
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ComponentId::new(id),
            role,
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            passthrough: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            invokes: BTreeSet::new(),
            confidence: Confidence::Declared,
        }
    }

    pub fn reading<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads.extend(fields.into_iter().map(|f| FieldId::new(f)));
        self
    }

    pub fn writing<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writes.extend(fields.into_iter().map(|f| FieldId::new(f)));
        self
    }

    pub fn passing<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough.extend(fields.into_iter().map(|f| FieldId::new(f)));
        self
    }

    pub fn holding<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(|c| CapabilityId::new(c)));
        self
    }

    pub fn invoking<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invokes
            .extend(capabilities.into_iter().map(|c| CapabilityId::new(c)));
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_unclear(&self) -> bool {
        self.confidence == Confidence::Unclear
    }

    /// `reads ∪ invokes`, empty for UNCLEAR components
    pub fn required(&self) -> BTreeSet<Subject> {
        if self.is_unclear() {
            return BTreeSet::new();
        }
        self.reads
            .iter()
            .cloned()
            .map(Subject::Field)
            .chain(self.invokes.iter().cloned().map(Subject::Capability))
            .collect()
    }

    /// Fields this component emits on every outgoing transition
    pub fn emits(&self) -> impl Iterator<Item = &FieldId> {
        self.writes.iter().chain(self.passthrough.iter())
    }
}

/// A directed edge between two components
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub from: ComponentId,
    pub to: ComponentId,
}

impl Transition {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: ComponentId::new(from),
            to: ComponentId::new(to),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

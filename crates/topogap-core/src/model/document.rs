//! Topology document
//!
//! The serialized form an Extractor hands to the engine. Documents can be
//! parsed from JSON, YAML or TOML, merged from several fragments, and
//! converted into a validated [`Topology`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Capability, CapabilityKind, Component, Confidence, Field, Role, Topology, Transition};
use crate::error::{GapError, Result};

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cardinal: bool,
}

/// Capability declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDecl {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: CapabilityKind,
}

/// Component declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDecl {
    pub id: String,
    pub role: Role,
    pub reads: BTreeSet<String>,
    pub writes: BTreeSet<String>,
    pub passthrough: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub invokes: BTreeSet<String>,
    #[serde(default)]
    pub confidence: Confidence,
}

/// Transition declaration
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransitionDecl {
    pub from: String,
    pub to: String,
}

/// A complete or partial topology as produced by an Extractor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDecl>,
    #[serde(default)]
    pub components: Vec<ComponentDecl>,
    #[serde(default)]
    pub transitions: Vec<TransitionDecl>,
}

impl TopologyDocument {
    /// Parse a JSON document
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| GapError::schema(format!("invalid topology JSON: {}", e)))
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| GapError::schema(format!("invalid topology YAML: {}", e)))
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GapError::schema(format!("invalid topology TOML: {}", e)))
    }

    /// Parse a document, picking the format from a file extension
    pub fn parse(extension: &str, content: &str) -> Result<Self> {
        match extension.to_lowercase().as_str() {
            "json" => Self::from_json(content),
            "yaml" | "yml" => Self::from_yaml(content),
            "toml" => Self::from_toml(content),
            other => Err(GapError::parse(format!(
                "Unsupported topology format: {}. Supported formats: json, yaml, yml, toml",
                other
            ))),
        }
    }

    /// Append another fragment. Duplicates surface later, in [`TopologyDocument::into_topology`].
    pub fn merge(&mut self, other: TopologyDocument) {
        self.fields.extend(other.fields);
        self.capabilities.extend(other.capabilities);
        self.components.extend(other.components);
        self.transitions.extend(other.transitions);
    }

    /// Build and validate the topology model.
    ///
    /// Fragments may omit any section, but the merged document must declare
    /// at least one component.
    pub fn into_topology(self) -> Result<Topology> {
        if self.components.is_empty() {
            return Err(GapError::schema("topology document declares no components"));
        }
        let mut topology = Topology::new();

        for decl in self.fields {
            let mut field = Field::new(decl.id, decl.cardinal);
            if let Some(name) = decl.name {
                field = field.with_name(name);
            }
            topology.add_field(field)?;
        }

        for decl in self.capabilities {
            let mut capability = Capability::new(decl.id, decl.kind);
            if let Some(name) = decl.name {
                capability.name = name;
            }
            topology.add_capability(capability)?;
        }

        for decl in self.components {
            let component = Component::new(decl.id, decl.role)
                .reading(decl.reads)
                .writing(decl.writes)
                .passing(decl.passthrough)
                .holding(decl.capabilities)
                .invoking(decl.invokes)
                .with_confidence(decl.confidence);
            topology.add_component(component)?;
        }

        for decl in self.transitions {
            topology.add_transition(Transition::new(decl.from, decl.to));
        }

        topology.validate()?;
        Ok(topology)
    }
}

fn texts<T: ToString>(ids: &BTreeSet<T>) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

impl From<&Topology> for TopologyDocument {
    fn from(topology: &Topology) -> Self {
        Self {
            fields: topology
                .fields()
                .values()
                .map(|f| FieldDecl {
                    id: f.id.to_string(),
                    name: (f.name != f.id.as_str()).then(|| f.name.clone()),
                    cardinal: f.cardinal,
                })
                .collect(),
            capabilities: topology
                .capabilities()
                .values()
                .map(|c| CapabilityDecl {
                    id: c.id.to_string(),
                    name: (c.name != c.id.as_str()).then(|| c.name.clone()),
                    kind: c.kind,
                })
                .collect(),
            components: topology
                .components()
                .values()
                .map(|c| ComponentDecl {
                    id: c.id.to_string(),
                    role: c.role,
                    reads: texts(&c.reads),
                    writes: texts(&c.writes),
                    passthrough: texts(&c.passthrough),
                    capabilities: texts(&c.capabilities),
                    invokes: texts(&c.invokes),
                    confidence: c.confidence,
                })
                .collect(),
            transitions: topology
                .transitions()
                .iter()
                .map(|t| TransitionDecl {
                    from: t.from.to_string(),
                    to: t.to.to_string(),
                })
                .collect(),
        }
    }
}

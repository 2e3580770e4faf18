//! Pattern rule table
//!
//! The taxonomy is data: an ordered list of predicate bindings, each naming a
//! failure pattern and optionally pinning its severity. The built-in table is
//! built once per process; configured tables are derived from it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::config::TaxonomyConfig;
use crate::error::{GapError, Result};
use crate::model::{ComponentId, Subject, Topology, Transition};

/// Severity tier of a classified gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or informational
    #[default]
    Low,
    /// Functional degradation only
    Medium,
    /// Visible failure
    High,
    /// Validation or grounding starved of its input
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = GapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(GapError::config(format!("unknown severity '{}'", other))),
        }
    }
}

/// Identifier of a failure pattern
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(String);

impl PatternId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatternId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

/// Pattern assigned to a gap
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Classification {
    Pattern(PatternId),
    Unclassified,
}

impl Classification {
    pub fn pattern(&self) -> Option<&PatternId> {
        match self {
            Classification::Pattern(id) => Some(id),
            Classification::Unclassified => None,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        matches!(self, Classification::Unclassified)
    }
}

impl From<String> for Classification {
    fn from(s: String) -> Self {
        if s == UNCLASSIFIED {
            Classification::Unclassified
        } else {
            Classification::Pattern(PatternId(s))
        }
    }
}

impl From<Classification> for String {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Pattern(id) => id.0,
            Classification::Unclassified => UNCLASSIFIED.to_string(),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Pattern(id) => write!(f, "{}", id),
            Classification::Unclassified => f.write_str(UNCLASSIFIED),
        }
    }
}

/// Everything a predicate may inspect about one gap
#[derive(Debug, Clone, Copy)]
pub struct GapContext<'a> {
    pub topology: &'a Topology,
    pub transition: &'a Transition,
    pub missing: &'a BTreeSet<Subject>,
    /// Members of the closed cycle for cycle-scoped gaps
    pub cycle: Option<&'a BTreeSet<ComponentId>>,
}

impl<'a> GapContext<'a> {
    /// Whether either endpoint is UNCLEAR
    pub fn touches_unclear(&self) -> bool {
        [&self.transition.from, &self.transition.to]
            .into_iter()
            .filter_map(|id| self.topology.component(id))
            .any(|c| c.is_unclear())
    }

    fn missing_fields(&self) -> impl Iterator<Item = &'a crate::model::FieldId> {
        self.missing.iter().filter_map(Subject::as_field)
    }

    fn has_missing_field(&self) -> bool {
        self.missing.iter().any(Subject::is_field)
    }

    /// Per-subject ranking, gap takes the maximum
    pub fn ranked_severity(&self) -> Severity {
        let bears_validation = self.topology.is_validation_bearing(&self.transition.to);
        self.missing
            .iter()
            .map(|subject| match subject {
                Subject::Field(_) if bears_validation => Severity::Critical,
                Subject::Capability(_) => Severity::High,
                Subject::Field(f) if self.topology.is_cardinal(f) => Severity::Medium,
                Subject::Field(_) => Severity::Low,
            })
            .max()
            .unwrap_or_default()
    }
}

/// Structural test bound to a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Predicate {
    /// Either endpoint of the transition is UNCLEAR
    TouchesUnclear,
    /// The gap is scoped to a closed cycle
    CycleScoped,
    /// A field is missing at a validation-bearing target
    FieldMissingAtValidator,
    /// Every missing subject is a capability some other component holds
    CapabilityHeldElsewhere,
    /// Every missing subject is a capability
    CapabilitiesOnly,
    /// Every missing field is produced upstream of the target and dropped on the way
    DroppedInTransit,
    /// Every missing field is produced by no component
    NoProducer,
    /// Every missing field is produced only by components that are not upstream
    ProducedDownstreamOnly,
}

impl Predicate {
    pub fn matches(&self, ctx: &GapContext<'_>) -> bool {
        let topology = ctx.topology;
        let target = &ctx.transition.to;

        match self {
            Predicate::TouchesUnclear => ctx.touches_unclear(),
            Predicate::CycleScoped => ctx.cycle.is_some(),
            Predicate::FieldMissingAtValidator => {
                ctx.has_missing_field() && topology.is_validation_bearing(target)
            }
            Predicate::CapabilityHeldElsewhere => ctx.missing.iter().all(|s| match s {
                Subject::Capability(c) => topology.holders(c).iter().any(|h| h != target),
                Subject::Field(_) => false,
            }),
            Predicate::CapabilitiesOnly => ctx.missing.iter().all(Subject::is_capability),
            Predicate::DroppedInTransit => {
                let upstream = topology.ancestors(target);
                ctx.has_missing_field()
                    && ctx
                        .missing_fields()
                        .all(|f| !topology.producers(f).is_disjoint(&upstream))
            }
            Predicate::NoProducer => {
                ctx.has_missing_field() && ctx.missing_fields().all(|f| topology.producers(f).is_empty())
            }
            Predicate::ProducedDownstreamOnly => {
                let upstream = topology.ancestors(target);
                ctx.has_missing_field()
                    && ctx.missing_fields().all(|f| {
                        let producers = topology.producers(f);
                        !producers.is_empty() && producers.is_disjoint(&upstream)
                    })
            }
        }
    }
}

/// One entry of the taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: PatternId,
    pub name: String,
    pub description: String,
    pub predicate: Predicate,
    /// Replaces the severity ranking for gaps this rule classifies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl PatternRule {
    pub fn new(
        id: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self {
            id: PatternId::from(id),
            name: name.into(),
            description: description.into(),
            predicate,
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Ordered pattern table; the first matching rule wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTable {
    rules: Vec<PatternRule>,
}

impl RuleTable {
    /// Build a table, rejecting duplicate pattern ids
    pub fn new(rules: Vec<PatternRule>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for rule in &rules {
            if rule.id.as_str() == UNCLASSIFIED {
                return Err(GapError::config(format!("pattern id '{}' is reserved", UNCLASSIFIED)));
            }
            if !seen.insert(rule.id.clone()) {
                return Err(GapError::config(format!("duplicate pattern id '{}'", rule.id)));
            }
        }
        Ok(Self { rules })
    }

    /// A table that classifies nothing
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Shared built-in taxonomy
    pub fn builtin() -> Arc<RuleTable> {
        static BUILTIN: OnceLock<Arc<RuleTable>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Arc::new(RuleTable { rules: builtin_rules() }))
            .clone()
    }

    /// Derive a table from the built-in one: append extra rules, drop
    /// disabled ones, move `order` entries to the front, apply severities.
    pub fn from_config(config: &TaxonomyConfig) -> Result<Self> {
        let mut rules = builtin_rules();
        rules.extend(config.extra.iter().cloned());
        let known: BTreeSet<PatternId> = rules.iter().map(|r| r.id.clone()).collect();

        let unknown = config
            .disabled
            .iter()
            .chain(config.order.iter())
            .chain(config.severity.keys())
            .find(|id| !known.contains(*id));
        if let Some(id) = unknown {
            return Err(GapError::config(format!("unknown pattern id '{}'", id)));
        }

        rules.retain(|r| !config.disabled.contains(&r.id));

        if !config.order.is_empty() {
            let rank: BTreeMap<&PatternId, usize> =
                config.order.iter().enumerate().map(|(i, id)| (id, i)).collect();
            // stable sort keeps built-in order for unlisted rules
            rules.sort_by_key(|r| rank.get(&r.id).copied().unwrap_or(usize::MAX));
        }

        for rule in rules.iter_mut() {
            if let Some(severity) = config.severity.get(&rule.id) {
                rule.severity = Some(*severity);
            }
        }

        Self::new(rules)
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &PatternId) -> Option<&PatternRule> {
        self.rules.iter().find(|r| &r.id == id)
    }

    /// First rule whose predicate holds
    pub fn first_match(&self, ctx: &GapContext<'_>) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.predicate.matches(ctx))
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        RuleTable::builtin().as_ref().clone()
    }
}

fn builtin_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "unclear-contract",
            "Unclear contract",
            "A component on this transition has a contract the extractor could not determine",
            Predicate::TouchesUnclear,
        ),
        PatternRule::new(
            "self-referential-validation",
            "Self-referential validation",
            "Requirements inside a closed cycle can only be satisfied by the cycle itself",
            Predicate::CycleScoped,
        ),
        PatternRule::new(
            "ungrounded-validation",
            "Ungrounded validation",
            "A validation or grounding step is missing a field it checks against",
            Predicate::FieldMissingAtValidator,
        ),
        PatternRule::new(
            "capability-misplaced",
            "Capability misplaced",
            "A needed capability is held by a different component",
            Predicate::CapabilityHeldElsewhere,
        ),
        PatternRule::new(
            "missing-capability",
            "Missing capability",
            "A needed capability is held by no component",
            Predicate::CapabilitiesOnly,
        ),
        PatternRule::new(
            "lost-in-transit",
            "Lost in transit",
            "An upstream component produces the field but an intermediate hop drops it",
            Predicate::DroppedInTransit,
        ),
        PatternRule::new(
            "phantom-input",
            "Phantom input",
            "The field is read but never produced",
            Predicate::NoProducer,
        ),
        PatternRule::new(
            "inverted-dependency",
            "Inverted dependency",
            "The field is produced only downstream of or beside its consumer",
            Predicate::ProducedDownstreamOnly,
        ),
    ]
}

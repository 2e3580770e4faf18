//! Pattern Classifier
//!
//! Assigns each contract gap a failure pattern from the ordered rule table
//! and a severity tier, and adds one cycle-scoped record per closed cycle
//! whose requirements can only be met from inside the cycle.

pub mod patterns;

pub use patterns::{
    Classification, GapContext, PatternId, PatternRule, Predicate, RuleTable, Severity,
    UNCLASSIFIED,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::RecoveredKind;
use crate::matcher::MatchOutcome;
use crate::model::{ComponentId, Subject, Topology, Transition};

/// A classified gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub transition: Transition,
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub missing: BTreeSet<Subject>,
    pub pattern: Classification,
    pub severity: Severity,
    /// Members of the closed cycle this record stands for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<BTreeSet<ComponentId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered: Option<RecoveredKind>,
}

impl Gap {
    /// Ordering key of a gap inside a report
    pub fn scope(&self) -> (&Transition, Option<&BTreeSet<ComponentId>>) {
        (&self.transition, self.cycle.as_ref())
    }

    pub fn is_cycle_scoped(&self) -> bool {
        self.cycle.is_some()
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<String> = self.missing.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "[{}] {} on {}: missing {}",
            self.severity,
            self.pattern,
            self.transition,
            missing.join(", ")
        )
    }
}

/// Ordered gap list for one topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub gaps: Vec<Gap>,
    pub topology_fingerprint: String,
}

impl GapReport {
    /// SHA-256 over the canonical JSON of the gap list
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        if let Ok(json) = serde_json::to_string(&self.gaps) {
            hasher.update(json.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Gaps at or above `threshold`
    pub fn blocking(&self, threshold: Severity) -> impl Iterator<Item = &Gap> {
        self.gaps.iter().filter(move |g| g.severity >= threshold)
    }

    pub fn is_clean(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Highest severity present
    pub fn max_severity(&self) -> Option<Severity> {
        self.gaps.iter().map(|g| g.severity).max()
    }

    pub fn count_at(&self, severity: Severity) -> usize {
        self.gaps.iter().filter(|g| g.severity == severity).count()
    }
}

/// Rule-table driven gap classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Arc<RuleTable>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// Classifier over the built-in taxonomy
    pub fn new() -> Self {
        Self {
            table: RuleTable::builtin(),
        }
    }

    pub fn with_table(table: RuleTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Classify one gap signature
    pub fn classify_gap(&self, ctx: &GapContext<'_>) -> Gap {
        let (pattern, severity, recovered) = match self.table.first_match(ctx) {
            Some(rule) => (
                Classification::Pattern(rule.id.clone()),
                rule.severity.unwrap_or_else(|| ctx.ranked_severity()),
                None,
            ),
            None => (
                Classification::Unclassified,
                Severity::Medium,
                Some(RecoveredKind::ClassificationAmbiguity),
            ),
        };

        let severity = if ctx.touches_unclear() {
            severity.max(Severity::High)
        } else {
            severity
        };

        debug!(
            transition = %ctx.transition,
            pattern = %pattern,
            severity = %severity,
            "Classified gap"
        );

        Gap {
            transition: ctx.transition.clone(),
            missing: ctx.missing.clone(),
            pattern,
            severity,
            cycle: ctx.cycle.cloned(),
            recovered,
        }
    }

    /// Classify a matcher pass into a gap report
    pub fn classify(&self, topology: &Topology, outcome: &MatchOutcome) -> GapReport {
        let mut gaps: Vec<Gap> = outcome
            .gaps
            .iter()
            .map(|gap| {
                self.classify_gap(&GapContext {
                    topology,
                    transition: &gap.transition,
                    missing: &gap.missing,
                    cycle: None,
                })
            })
            .collect();

        for (members, transition, missing) in cycle_scopes(topology) {
            gaps.push(self.classify_gap(&GapContext {
                topology,
                transition: &transition,
                missing: &missing,
                cycle: Some(&members),
            }));
        }

        gaps.sort_by(|a, b| a.scope().cmp(&b.scope()));

        info!(
            gaps = gaps.len(),
            critical = gaps.iter().filter(|g| g.severity == Severity::Critical).count(),
            "Classification complete"
        );

        GapReport {
            gaps,
            topology_fingerprint: topology.fingerprint(),
        }
    }
}

/// One `(members, canonical transition, required(target))` per closed cycle
/// (see [`Topology::closed_cycles`]) with something to require.
///
/// The canonical transition is the smallest intra-cycle transition, ranking
/// targets with requirements first and validation-bearing targets next.
fn cycle_scopes(
    topology: &Topology,
) -> Vec<(BTreeSet<ComponentId>, Transition, BTreeSet<Subject>)> {
    topology
        .closed_cycles()
        .into_iter()
        .filter_map(|members| {
            let (_, _, transition, required) = topology
                .transitions()
                .iter()
                .filter(|t| members.contains(&t.from) && members.contains(&t.to))
                .map(|t| {
                    let required = topology.required(&t.to);
                    (
                        required.is_empty(),
                        !topology.is_validation_bearing(&t.to),
                        t.clone(),
                        required,
                    )
                })
                .min_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)))?;

            if required.is_empty() {
                return None;
            }
            debug!(%transition, members = members.len(), "Cycle-scoped gap");
            Some((members, transition, required))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ContractMatcher;
    use crate::model::{Component, Confidence, Field, Role};

    fn report(topology: &Topology, classifier: &Classifier) -> GapReport {
        let outcome = ContractMatcher::new().match_topology(topology).unwrap();
        classifier.classify(topology, &outcome)
    }

    #[test]
    fn test_missing_field_at_validator_is_critical() {
        let topology = Topology::new()
            .with_field(Field::new("docs", false))
            .unwrap()
            .with_component(Component::new("a", Role::Generator))
            .unwrap()
            .with_component(Component::new("v", Role::Validator).reading(["docs"]))
            .unwrap()
            .with_transition("a", "v");

        let report = report(&topology, &Classifier::new());
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].severity, Severity::Critical);
        assert_eq!(
            report.gaps[0].pattern,
            Classification::Pattern(PatternId::from("ungrounded-validation"))
        );
    }

    #[test]
    fn test_empty_table_yields_unclassified_medium() {
        let topology = Topology::new()
            .with_field(Field::new("docs", false))
            .unwrap()
            .with_component(Component::new("a", Role::Generator))
            .unwrap()
            .with_component(Component::new("v", Role::Validator).reading(["docs"]))
            .unwrap()
            .with_transition("a", "v");

        let report = report(&topology, &Classifier::with_table(RuleTable::empty()));
        assert!(report.gaps[0].pattern.is_unclassified());
        assert_eq!(report.gaps[0].severity, Severity::Medium);
        assert_eq!(
            report.gaps[0].recovered,
            Some(RecoveredKind::ClassificationAmbiguity)
        );
    }

    #[test]
    fn test_unclear_source_floors_at_high() {
        let topology = Topology::new()
            .with_field(Field::new("draft", false))
            .unwrap()
            .with_component(Component::new("u", Role::Other).with_confidence(Confidence::Unclear))
            .unwrap()
            .with_component(Component::new("g", Role::Generator).reading(["draft"]))
            .unwrap()
            .with_transition("u", "g");

        let report = report(&topology, &Classifier::new());
        assert_eq!(report.gaps[0].severity, Severity::High);
        assert_eq!(report.gaps[0].pattern.to_string(), "unclear-contract");
    }

    #[test]
    fn test_closed_cycle_emits_one_scoped_gap() {
        let topology = Topology::new()
            .with_field(Field::new("draft", true))
            .unwrap()
            .with_component(Component::new("a", Role::Generator).reading(["draft"]))
            .unwrap()
            .with_component(Component::new("b", Role::Validator).reading(["draft"]))
            .unwrap()
            .with_transition("a", "b")
            .with_transition("b", "a");

        let report = report(&topology, &Classifier::new());
        let scoped: Vec<&Gap> = report.gaps.iter().filter(|g| g.is_cycle_scoped()).collect();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].transition, Transition::new("a", "b"));
        assert_eq!(scoped[0].pattern.to_string(), "self-referential-validation");
        assert_eq!(scoped[0].cycle.as_ref().map(|c| c.len()), Some(2));
    }

    #[test]
    fn test_cycle_fed_only_unread_fields_is_self_referential() {
        let topology = Topology::new()
            .with_field(Field::new("noise", false))
            .unwrap()
            .with_field(Field::new("draft", true))
            .unwrap()
            .with_component(Component::new("x", Role::Retriever).writing(["noise"]))
            .unwrap()
            .with_component(Component::new("a", Role::Generator).writing(["draft"]))
            .unwrap()
            .with_component(Component::new("b", Role::Validator).reading(["draft"]))
            .unwrap()
            .with_transition("x", "a")
            .with_transition("a", "b")
            .with_transition("b", "a");

        let report = report(&topology, &Classifier::new());
        let scoped: Vec<&Gap> = report
            .gaps
            .iter()
            .filter(|g| g.pattern.to_string() == "self-referential-validation")
            .collect();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].transition, Transition::new("a", "b"));
        assert!(scoped[0].missing.contains(&Subject::field("draft")));
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let topology = Topology::new()
            .with_field(Field::new("docs", false))
            .unwrap()
            .with_component(Component::new("a", Role::Generator))
            .unwrap()
            .with_component(Component::new("v", Role::Validator).reading(["docs"]))
            .unwrap()
            .with_transition("a", "v");
        let classifier = Classifier::new();
        let first = report(&topology, &classifier);
        let second = report(&topology, &classifier);
        assert_eq!(first.digest(), second.digest());

        let clean = report(&Topology::new(), &classifier);
        assert_ne!(first.digest(), clean.digest());
        assert_eq!(first.blocking(Severity::High).count(), 1);
        assert_eq!(first.max_severity(), Some(Severity::Critical));
    }
}

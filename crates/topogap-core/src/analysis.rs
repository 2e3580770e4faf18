//! One Contract Matcher + Classifier pass

use tracing::info;

use crate::classifier::{Classifier, GapReport, RuleTable};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::matcher::{ContractMatcher, MatchOutcome};
use crate::model::Topology;

/// Matcher and classifier configured for one session
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    matcher: ContractMatcher,
    classifier: Classifier,
}

impl Analyzer {
    /// Built-in taxonomy and default fixed-point cap
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let mut matcher = ContractMatcher::new();
        if let Some(cap) = config.fixpoint_cap {
            matcher = matcher.with_fixpoint_cap(cap);
        }
        let classifier = if config.taxonomy == Default::default() {
            Classifier::new()
        } else {
            Classifier::with_table(RuleTable::from_config(&config.taxonomy)?)
        };
        Ok(Self {
            matcher,
            classifier,
        })
    }

    pub fn with_parts(matcher: ContractMatcher, classifier: Classifier) -> Self {
        Self {
            matcher,
            classifier,
        }
    }

    pub fn matcher(&self) -> &ContractMatcher {
        &self.matcher
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run the matcher only
    pub fn match_topology(&self, topology: &Topology) -> Result<MatchOutcome> {
        self.matcher.match_topology(topology)
    }

    /// Compute and classify every gap of `topology`
    pub fn analyze(&self, topology: &Topology) -> Result<GapReport> {
        let outcome = self.matcher.match_topology(topology)?;
        let report = self.classifier.classify(topology, &outcome);
        info!(
            components = topology.components().len(),
            transitions = topology.transitions().len(),
            iterations = outcome.availability.iterations(),
            gaps = report.gaps.len(),
            "Analysis pass complete"
        );
        Ok(report)
    }
}

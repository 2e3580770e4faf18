//! End-to-end scenarios for the analysis engine
//!
//! Covers:
//! - cardinal persistence along a retrieval chain
//! - targeted closure of a single gap
//! - single counting of closed cycles
//! - deliberation of capability removals
//! - regression detection in the verification loop
//! - fatal and recovered error conditions

use std::collections::BTreeSet;
use topogap_core::{
    AnalysisConfig, Analyzer, CapabilityId, Classification, Component, ComponentId, Confidence,
    ContractSlot, DeliberationEngine, Field, Fix, FixAction, GapError, PatternId, RecoveredKind,
    Role, Severity, Subject, Topology, TopologyDocument, Transition, Verdict, VerificationLoop,
    VerificationStatus,
};

/// Retriever → Responder → Validator, where only `query` is cardinal
fn retrieval_chain() -> Topology {
    Topology::new()
        .with_field(Field::new("query", true))
        .unwrap()
        .with_field(Field::new("docs", false))
        .unwrap()
        .with_field(Field::new("response", false))
        .unwrap()
        .with_component(Component::new("retriever", Role::Retriever).writing(["query", "docs"]))
        .unwrap()
        .with_component(
            Component::new("responder", Role::Generator)
                .reading(["query"])
                .writing(["response"]),
        )
        .unwrap()
        .with_component(
            Component::new("validator", Role::Validator).reading(["response", "docs", "query"]),
        )
        .unwrap()
        .with_transition("retriever", "responder")
        .with_transition("responder", "validator")
}

fn subjects(fields: &[&str]) -> BTreeSet<Subject> {
    fields.iter().map(|f| Subject::field(*f)).collect()
}

#[test]
fn test_cardinal_persistence() {
    let topology = retrieval_chain();
    let analyzer = Analyzer::new();

    let outcome = analyzer.match_topology(&topology).unwrap();
    let last_hop = Transition::new("responder", "validator");
    assert_eq!(
        outcome.availability.available_on(&topology, &last_hop),
        subjects(&["query", "response"])
    );

    let report = analyzer.analyze(&topology).unwrap();
    assert_eq!(report.gaps.len(), 1);
    let gap = &report.gaps[0];
    assert_eq!(gap.transition, last_hop);
    assert_eq!(gap.missing, subjects(&["docs"]));
    assert_eq!(gap.severity, Severity::Critical);
    assert_eq!(
        gap.pattern,
        Classification::Pattern(PatternId::from("ungrounded-validation"))
    );
}

#[test]
fn test_targeted_closure_leaves_other_gaps_alone() {
    let topology = retrieval_chain()
        .with_field(Field::new("notes", false))
        .unwrap()
        .with_component(Component::new("router", Role::Router))
        .unwrap()
        .with_component(Component::new("summarizer", Role::Generator).reading(["notes"]))
        .unwrap()
        .with_transition("router", "summarizer");

    let analyzer = Analyzer::new();
    let baseline = analyzer.analyze(&topology).unwrap();
    assert_eq!(baseline.gaps.len(), 2);
    let unrelated = baseline
        .gaps
        .iter()
        .find(|g| g.transition == Transition::new("router", "summarizer"))
        .cloned()
        .unwrap();

    let fix = Fix::add("responder", Subject::field("docs")).in_slot(ContractSlot::Passthrough);
    let revised = topology.revised(&[fix]).unwrap();

    let mut verification = VerificationLoop::new(analyzer, baseline, 3);
    let report = verification.verify(&revised).unwrap();

    assert_eq!(report.closed.len(), 1);
    assert_eq!(report.closed[0].transition, Transition::new("responder", "validator"));
    assert_eq!(report.closed[0].missing, subjects(&["docs"]));
    assert_eq!(report.remaining, vec![unrelated]);
    assert!(report.introduced.is_empty());
    assert_eq!(report.status, VerificationStatus::NeedsIteration);
}

#[test]
fn test_closed_cycle_counted_once() {
    // `seed` makes the fixed point take several rounds inside the cycle
    let topology = Topology::new()
        .with_field(Field::new("seed", true))
        .unwrap()
        .with_field(Field::new("evidence", true))
        .unwrap()
        .with_component(
            Component::new("a", Role::Generator)
                .reading(["evidence"])
                .writing(["seed"]),
        )
        .unwrap()
        .with_component(Component::new("b", Role::Validator).reading(["evidence", "seed"]))
        .unwrap()
        .with_transition("a", "b")
        .with_transition("b", "a");

    let analyzer = Analyzer::new();
    let outcome = analyzer.match_topology(&topology).unwrap();
    assert!(outcome.availability.iterations() > 1);

    let report = analyzer.analyze(&topology).unwrap();
    let self_referential: Vec<_> = report
        .gaps
        .iter()
        .filter(|g| g.pattern.to_string() == "self-referential-validation")
        .collect();
    assert_eq!(self_referential.len(), 1);

    let members: BTreeSet<ComponentId> = ["a", "b"].into_iter().map(ComponentId::from).collect();
    assert_eq!(self_referential[0].cycle.as_ref(), Some(&members));
    assert_eq!(self_referential[0].transition, Transition::new("a", "b"));
}

#[test]
fn test_open_cycle_has_no_scoped_gap() {
    let topology = retrieval_chain().with_transition("validator", "responder");
    let report = Analyzer::new().analyze(&topology).unwrap();
    assert!(report.gaps.iter().all(|g| g.cycle.is_none()));
}

#[test]
fn test_capability_removal_deliberation() {
    let base = Topology::new()
        .with_component(Component::new("x", Role::Retriever).holding(["WebSearch"]))
        .unwrap()
        .with_component(Component::new("z", Role::Generator))
        .unwrap()
        .with_transition("x", "z");
    let fix = Fix::remove("x", Subject::capability("WebSearch"));
    let engine = DeliberationEngine::new();

    let verdict = engine.deliberate_fix(&base, &fix).unwrap();
    assert_eq!(verdict.verdict, Verdict::Proceed);

    let with_dependent = base
        .with_component(Component::new("y", Role::Generator).invoking(["WebSearch"]))
        .unwrap();
    let verdict = engine.deliberate_fix(&with_dependent, &fix).unwrap();
    assert_eq!(verdict.verdict, Verdict::Redesigned);
    let relocation = verdict.relocation.unwrap();
    assert_eq!(
        relocation.action,
        FixAction::Relocate {
            to: ComponentId::from("y")
        }
    );
    assert_eq!(relocation.subject, Subject::capability("WebSearch"));

    // the relocation is a valid revision
    let revised = with_dependent.revised(&[relocation]).unwrap();
    assert!(revised
        .component(&ComponentId::from("y"))
        .unwrap()
        .capabilities
        .contains(&CapabilityId::from("WebSearch")));
}

#[test]
fn test_regression_is_reported_as_introduced() {
    let topology = retrieval_chain();
    let analyzer = Analyzer::new();
    let baseline = analyzer.analyze(&topology).unwrap();

    let closes = Fix::add("responder", Subject::field("docs")).in_slot(ContractSlot::Passthrough);
    let breaks = Fix::remove("retriever", Subject::field("query"));

    // deliberation would have deferred the removal: every reader of
    // `query` is a dependent, so nobody upstream can take it over
    let set = DeliberationEngine::new()
        .deliberate(&topology, &[closes.clone(), breaks.clone()])
        .unwrap();
    assert_eq!(set.verdicts[1].verdict, Verdict::Flagged);

    // an Applier that ignores it produces a regression
    let revised = topology.revised(&[closes, breaks]).unwrap();
    let mut verification = VerificationLoop::new(analyzer, baseline, 3);
    let report = verification.verify(&revised).unwrap();

    assert_eq!(report.closed.len(), 1);
    assert!(report
        .introduced
        .iter()
        .any(|g| g.transition == Transition::new("retriever", "responder")
            && g.missing.contains(&Subject::field("query"))));
    assert_eq!(report.status, VerificationStatus::NeedsIteration);
    assert!(!verification.outstanding().is_empty());
}

#[test]
fn test_iteration_budget_is_fatal() {
    let topology = retrieval_chain();
    let analyzer = Analyzer::new();
    let baseline = analyzer.analyze(&topology).unwrap();
    let mut verification = VerificationLoop::new(analyzer, baseline, 2);

    for _ in 0..2 {
        let report = verification.verify(&topology).unwrap();
        assert_eq!(report.status, VerificationStatus::NeedsIteration);
    }
    assert!(matches!(
        verification.verify(&topology),
        Err(GapError::IterationBudgetExhausted { max_iterations: 2 })
    ));
}

#[test]
fn test_cycle_divergence_with_low_cap() {
    let config = AnalysisConfig::default().with_fixpoint_cap(2);
    let analyzer = Analyzer::from_config(&config).unwrap();
    let err = analyzer.analyze(&retrieval_chain()).unwrap_err();
    assert_eq!(err, GapError::CycleDivergence { iterations: 2, cap: 2 });
    assert!(!err.is_user_error());
}

#[test]
fn test_empty_taxonomy_degrades_to_unclassified() {
    let mut config = AnalysisConfig::default();
    config.taxonomy.disabled = Analyzer::new()
        .classifier()
        .table()
        .rules()
        .iter()
        .map(|r| r.id.clone())
        .collect();

    let report = Analyzer::from_config(&config)
        .unwrap()
        .analyze(&retrieval_chain())
        .unwrap();
    assert_eq!(report.gaps[0].pattern, Classification::Unclassified);
    assert_eq!(report.gaps[0].severity, Severity::Medium);
    assert_eq!(
        report.gaps[0].recovered,
        Some(RecoveredKind::ClassificationAmbiguity)
    );
}

#[test]
fn test_unclear_component_is_visible_not_fatal() {
    let mut topology = retrieval_chain();
    let mystery = Component::new("mystery", Role::Other)
        .writing(["docs"])
        .with_confidence(Confidence::Unclear);
    topology.add_component(mystery).unwrap();
    topology.add_transition(Transition::new("mystery", "validator"));

    let report = Analyzer::new().analyze(&topology).unwrap();
    let touching: Vec<_> = report
        .gaps
        .iter()
        .filter(|g| g.transition.from == ComponentId::from("mystery"))
        .collect();
    assert_eq!(touching.len(), 1);
    assert!(touching[0].severity >= Severity::High);
    assert_eq!(touching[0].pattern.to_string(), "unclear-contract");
}

#[test]
fn test_document_ingestion_matches_builder() {
    let yaml = r#"
fields:
  - { id: query, cardinal: true }
  - { id: docs, cardinal: false }
  - { id: response, cardinal: false }
components:
  - { id: retriever, role: retriever, reads: [], writes: [query, docs], passthrough: [], capabilities: [] }
  - { id: responder, role: generator, reads: [query], writes: [response], passthrough: [], capabilities: [] }
  - { id: validator, role: validator, reads: [response, docs, query], writes: [], passthrough: [], capabilities: [] }
transitions:
  - { from: retriever, to: responder }
  - { from: responder, to: validator }
"#;
    let topology = TopologyDocument::from_yaml(yaml)
        .unwrap()
        .into_topology()
        .unwrap();
    assert_eq!(topology, retrieval_chain());
    assert_eq!(topology.fingerprint(), retrieval_chain().fingerprint());
}

#[test]
fn test_reports_are_byte_identical_across_runs() {
    let topology = retrieval_chain().with_transition("validator", "retriever");
    let first = Analyzer::new().analyze(&topology).unwrap();
    let second = Analyzer::new().analyze(&topology.clone()).unwrap();
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(first.digest(), second.digest());
}

//! Property tests for the matcher and classifier over random topologies

use proptest::prelude::*;
use std::collections::BTreeSet;
use topogap_core::{
    Analyzer, Component, ComponentId, Confidence, ContractMatcher, Field, FieldId, MatchOutcome,
    Role, Subject, Topology, TopologyDocument, Transition,
};

const FIELDS: [&str; 4] = ["f0", "f1", "f2", "f3"];
const CAPABILITIES: [&str; 3] = ["c0", "c1", "c2"];

#[derive(Debug, Clone)]
struct RawComponent {
    reads: u8,
    writes: u8,
    passthrough: u8,
    holds: u8,
    invokes: u8,
    unclear: bool,
}

fn pick<'a>(mask: u8, names: &[&'a str]) -> Vec<&'a str> {
    names
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, name)| *name)
        .collect()
}

fn arb_component() -> impl Strategy<Value = RawComponent> {
    (
        0u8..16,
        0u8..16,
        0u8..16,
        0u8..8,
        0u8..8,
        prop::bool::weighted(0.1),
    )
        .prop_map(|(reads, writes, passthrough, holds, invokes, unclear)| RawComponent {
            reads,
            writes,
            passthrough: passthrough & !writes,
            holds,
            invokes,
            unclear,
        })
}

fn build(components: &[RawComponent], cardinal: u8, edges: &[(usize, usize)]) -> Topology {
    let mut topology = Topology::new();
    for (i, name) in FIELDS.iter().enumerate() {
        topology
            .add_field(Field::new(*name, cardinal & (1 << i) != 0))
            .unwrap();
    }
    for (i, raw) in components.iter().enumerate() {
        let confidence = if raw.unclear {
            Confidence::Unclear
        } else {
            Confidence::Declared
        };
        let component = Component::new(format!("n{}", i), Role::Generator)
            .reading(pick(raw.reads, &FIELDS))
            .writing(pick(raw.writes, &FIELDS))
            .passing(pick(raw.passthrough, &FIELDS))
            .holding(pick(raw.holds, &CAPABILITIES))
            .invoking(pick(raw.invokes, &CAPABILITIES))
            .with_confidence(confidence);
        topology.add_component(component).unwrap();
    }
    let n = components.len();
    for (from, to) in edges {
        topology.add_transition(Transition::new(format!("n{}", from % n), format!("n{}", to % n)));
    }
    topology
}

fn arb_topology() -> impl Strategy<Value = Topology> {
    (
        prop::collection::vec(arb_component(), 1..7),
        0u8..16,
        prop::collection::vec((0usize..7, 0usize..7), 0..14),
    )
        .prop_map(|(components, cardinal, edges)| build(&components, cardinal, &edges))
}

fn missing_on(outcome: &MatchOutcome, transition: &Transition) -> BTreeSet<Subject> {
    outcome
        .gap_on(transition)
        .map(|g| g.missing.clone())
        .unwrap_or_default()
}

/// Every transition of `topology` has a gap in `after` no larger than in `before`
fn no_gap_grew(topology: &Topology, before: &MatchOutcome, after: &MatchOutcome) -> bool {
    topology
        .transitions()
        .iter()
        .all(|t| missing_on(after, t).is_subset(&missing_on(before, t)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_fixpoint_terminates_within_default_cap(topology in arb_topology()) {
        let matcher = ContractMatcher::new();
        let availability = matcher.availability(&topology);
        prop_assert!(availability.is_ok());
        prop_assert!(availability.unwrap().iterations() <= matcher.cap_for(&topology));
    }

    #[test]
    fn prop_adding_an_edge_never_grows_a_gap(
        topology in arb_topology(),
        from in 0usize..7,
        to in 0usize..7,
    ) {
        let n = topology.components().len();
        let matcher = ContractMatcher::new();
        let before = matcher.match_topology(&topology).unwrap();

        let mut widened = topology.clone();
        widened.add_transition(Transition::new(format!("n{}", from % n), format!("n{}", to % n)));
        let after = matcher.match_topology(&widened).unwrap();

        prop_assert!(no_gap_grew(&topology, &before, &after));
    }

    #[test]
    fn prop_adding_a_write_never_grows_a_gap(
        topology in arb_topology(),
        target in 0usize..7,
        field in 0usize..4,
    ) {
        let n = topology.components().len();
        let id = ComponentId::new(format!("n{}", target % n));
        let field = FieldId::from(FIELDS[field]);
        let matcher = ContractMatcher::new();
        let before = matcher.match_topology(&topology).unwrap();

        let mut document = TopologyDocument::from(&topology);
        for decl in document.components.iter_mut().filter(|c| c.id == id.as_str()) {
            decl.passthrough.remove(field.as_str());
            decl.writes.insert(field.to_string());
        }
        let widened = document.into_topology().unwrap();
        let after = matcher.match_topology(&widened).unwrap();

        // moving a passthrough entry into writes keeps the field emitted
        prop_assert!(no_gap_grew(&topology, &before, &after));
    }

    #[test]
    fn prop_narrowing_required_never_grows_a_gap(
        topology in arb_topology(),
        target in 0usize..7,
        field in 0usize..4,
    ) {
        let n = topology.components().len();
        let id = format!("n{}", target % n);
        let matcher = ContractMatcher::new();
        let before = matcher.match_topology(&topology).unwrap();

        let mut document = TopologyDocument::from(&topology);
        for decl in document.components.iter_mut().filter(|c| c.id == id) {
            decl.reads.remove(FIELDS[field]);
            decl.invokes.clear();
        }
        let narrowed = document.into_topology().unwrap();
        let after = matcher.match_topology(&narrowed).unwrap();

        prop_assert!(no_gap_grew(&topology, &before, &after));
    }

    #[test]
    fn prop_reports_are_deterministic(topology in arb_topology()) {
        let analyzer = Analyzer::new();
        let first = analyzer.analyze(&topology).unwrap();
        let second = analyzer.analyze(&topology).unwrap();
        prop_assert_eq!(first.digest(), second.digest());

        // declaration order does not matter
        let mut document = TopologyDocument::from(&topology);
        document.fields.reverse();
        document.components.reverse();
        document.transitions.reverse();
        let reordered = document.into_topology().unwrap();
        let third = analyzer.analyze(&reordered).unwrap();
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&third).unwrap()
        );
    }

    #[test]
    fn prop_closed_cycles_are_counted_once(topology in arb_topology()) {
        let report = Analyzer::new().analyze(&topology).unwrap();
        let scoped: Vec<_> = report.gaps.iter().filter_map(|g| g.cycle.clone()).collect();
        let distinct: BTreeSet<_> = scoped.iter().cloned().collect();
        prop_assert_eq!(scoped.len(), distinct.len());
        prop_assert!(scoped.len() <= topology.closed_cycles().len());
    }
}

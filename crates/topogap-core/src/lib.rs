//! Topogap core
//!
//! Contract-gap analysis for multi-component pipelines. Given a topology of
//! components, their read/write/passthrough/capability contracts and the
//! transitions between them, the engine finds where a component lacks data
//! or a capability it requires, classifies each gap against an ordered
//! pattern table, and checks proposed fixes against the whole graph before
//! they are applied.
//!
//! ## Architecture
//!
//! 1. **Model** (`model/`): identifiers, components, the topology graph with
//!    its invariants, the serialized topology document and fix revisions.
//! 2. **Matcher** (`matcher`): bounded fixed point over cardinal fields and
//!    per-transition gap computation.
//! 3. **Classifier** (`classifier/`): rule table, severity ranking and
//!    cycle-scoped gaps.
//! 4. **Deliberation** (`deliberation`): PROCEED / REDESIGNED / FLAGGED
//!    verdicts for proposed fixes.
//! 5. **Verification** (`verification`): diffing of successive gap reports
//!    under an iteration budget.
//! 6. **Session** (`session`): phase checkpoints for an external driver.
//!
//! The engine is synchronous and performs no I/O apart from loading an
//! optional configuration file.
//!
//! ## Example
//!
//! ```rust
//! use topogap_core::{Analyzer, Component, Field, Role, Severity, Topology};
//!
//! let topology = Topology::new()
//!     .with_field(Field::new("query", true))?
//!     .with_field(Field::new("docs", false))?
//!     .with_field(Field::new("response", false))?
//!     .with_component(Component::new("retriever", Role::Retriever).writing(["query", "docs"]))?
//!     .with_component(
//!         Component::new("responder", Role::Generator)
//!             .reading(["query"])
//!             .writing(["response"]),
//!     )?
//!     .with_component(
//!         Component::new("validator", Role::Validator).reading(["response", "docs", "query"]),
//!     )?
//!     .with_transition("retriever", "responder")
//!     .with_transition("responder", "validator");
//!
//! let report = Analyzer::new().analyze(&topology)?;
//! assert_eq!(report.gaps.len(), 1);
//! assert_eq!(report.gaps[0].severity, Severity::Critical);
//! # Ok::<(), topogap_core::GapError>(())
//! ```

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod deliberation;
pub mod error;
pub mod matcher;
pub mod model;
pub mod session;
pub mod verification;

pub use analysis::Analyzer;
pub use classifier::{
    Classification, Classifier, Gap, GapReport, PatternId, PatternRule, Predicate, RuleTable,
    Severity,
};
pub use config::{AnalysisConfig, TaxonomyConfig};
pub use deliberation::{
    DeliberatedFixSet, DeliberationEngine, DeliberationState, DeliberationVerdict, Verdict,
};
pub use error::{GapError, RecoveredKind, Result};
pub use matcher::{Availability, ContractGap, ContractMatcher, MatchOutcome};
pub use model::{
    Capability, CapabilityId, CapabilityKind, Component, ComponentId, Confidence, ContractSlot,
    Field, FieldId, Fix, FixAction, FixTarget, Role, Subject, Topology, TopologyDocument,
    Transition,
};
pub use session::{ApplyPlan, Checkpoint, Phase, ScanSummary, Session};
pub use verification::{VerificationLoop, VerificationReport, VerificationStatus};

//! Integration tests for the topogap CLI
//!
//! Drives the commands end to end over topology, fix and config files
//! written to a temporary directory:
//! - exit codes for analyze, deliberate, verify and taxonomy
//! - directory ingestion
//! - baseline and fix-round verification
//! - fatal engine errors surfacing as dedicated exit codes

use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use topogap_cli::cli::commands;
use topogap_cli::{run_cli, ExitCode, GapCli};
use topogap_core::{AnalysisConfig, Severity, Subject, Verdict, VerificationStatus};

const FIELDS: &str = r#"
fields:
  - { id: query, cardinal: true }
  - { id: docs, cardinal: false }
  - { id: response, cardinal: false }
"#;

const CHAIN: &str = r#"
components:
  - { id: retriever, role: retriever, reads: [], writes: [query, docs], passthrough: [], capabilities: [] }
  - { id: responder, role: generator, reads: [query], writes: [response], passthrough: [], capabilities: [] }
  - { id: validator, role: validator, reads: [response, docs, query], writes: [], passthrough: [], capabilities: [] }
transitions:
  - { from: retriever, to: responder }
  - { from: responder, to: validator }
"#;

const FORWARD_DOCS: &str = r#"[
  {"target": {"component": "responder"}, "action": "add", "subject": {"field": "docs"}, "slot": "passthrough"}
]"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn chain(dir: &TempDir) -> PathBuf {
    write(dir, "chain.yaml", &format!("{}{}", FIELDS, CHAIN))
}

async fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["topogap"];
    argv.extend_from_slice(args);
    run_cli(GapCli::try_parse_from(argv).unwrap()).await
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[tokio::test]
async fn test_analyze_reports_unresolved_gap() {
    let dir = TempDir::new().unwrap();
    let path = chain(&dir);

    let report = commands::analyze(&path, &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].severity, Severity::Critical);

    assert_eq!(
        run(&["analyze", arg(&path), "--format", "json"]).await,
        ExitCode::UnresolvedGaps
    );
}

#[tokio::test]
async fn test_analyze_clean_topology_succeeds() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "clean.json",
        r#"{
            "fields": [{"id": "docs", "cardinal": false}],
            "components": [
                {"id": "r", "role": "retriever", "reads": [], "writes": ["docs"], "passthrough": [], "capabilities": []},
                {"id": "v", "role": "validator", "reads": ["docs"], "writes": [], "passthrough": [], "capabilities": []}
            ],
            "transitions": [{"from": "r", "to": "v"}]
        }"#,
    );
    assert_eq!(
        run(&["analyze", arg(&path), "--format", "yaml"]).await,
        ExitCode::Success
    );
}

#[tokio::test]
async fn test_directory_matches_single_document() {
    let dir = TempDir::new().unwrap();
    let single = chain(&dir);

    let fragments = TempDir::new().unwrap();
    write(&fragments, "00-fields.yaml", FIELDS);
    write(&fragments, "10-chain.yaml", CHAIN);

    let config = AnalysisConfig::default();
    let from_file = commands::analyze(&single, &config).await.unwrap();
    let from_dir = commands::analyze(fragments.path(), &config).await.unwrap();
    assert_eq!(from_file.digest(), from_dir.digest());
    assert_eq!(from_file.topology_fingerprint, from_dir.topology_fingerprint);
}

#[tokio::test]
async fn test_input_errors_map_to_exit_codes() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.yaml");
    assert_eq!(run(&["analyze", arg(&missing)]).await, ExitCode::InvalidPath);

    let dangling = write(
        &dir,
        "dangling.yaml",
        &format!(
            "{}{}\n  - {{ from: responder, to: ghost }}\n",
            FIELDS,
            CHAIN.trim_end()
        ),
    );
    assert_eq!(
        run(&["analyze", arg(&dangling)]).await,
        ExitCode::SchemaViolation
    );

    let bad_config = write(&dir, "topogap.toml", "max_iterations = 0\n");
    let path = chain(&dir);
    assert_eq!(
        run(&["--config", arg(&bad_config), "analyze", arg(&path)]).await,
        ExitCode::InvalidInput
    );
}

#[tokio::test]
async fn test_deliberate_exit_codes() {
    let dir = TempDir::new().unwrap();
    let topology = write(
        &dir,
        "tools.yaml",
        r#"
components:
  - { id: x, role: retriever, reads: [], writes: [], passthrough: [], capabilities: [WebSearch] }
  - { id: y, role: generator, reads: [], writes: [], passthrough: [], capabilities: [], invokes: [WebSearch] }
  - { id: z, role: generator, reads: [], writes: [], passthrough: [], capabilities: [] }
transitions:
  - { from: x, to: y }
  - { from: x, to: z }
"#,
    );
    let removal = write(
        &dir,
        "remove.json",
        r#"[{"target": {"component": "x"}, "action": "remove", "subject": {"capability": "WebSearch"}}]"#,
    );

    let set = commands::deliberate(&topology, &removal, &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(set.verdicts[0].verdict, Verdict::Redesigned);
    assert_eq!(
        run(&["deliberate", arg(&topology), "--fixes", arg(&removal)]).await,
        ExitCode::Success
    );

    // a second invoker leaves two possible owners
    let contested = write(
        &dir,
        "contested.yaml",
        r#"
components:
  - { id: x, role: retriever, reads: [], writes: [], passthrough: [], capabilities: [WebSearch] }
  - { id: y, role: generator, reads: [], writes: [], passthrough: [], capabilities: [], invokes: [WebSearch] }
  - { id: z, role: generator, reads: [], writes: [], passthrough: [], capabilities: [], invokes: [WebSearch] }
transitions:
  - { from: x, to: y }
  - { from: x, to: z }
"#,
    );
    assert_eq!(
        run(&["deliberate", arg(&contested), "--fixes", arg(&removal), "--format", "json"]).await,
        ExitCode::FixesDeferred
    );
}

#[tokio::test]
async fn test_verify_fix_rounds() {
    let dir = TempDir::new().unwrap();
    let path = chain(&dir);
    let nothing = write(&dir, "round1.json", "[]");
    let forward = write(&dir, "round2.json", FORWARD_DOCS);
    let unused = write(&dir, "round3.json", "[]");

    let run_result = commands::verify(
        &path,
        None,
        &[nothing.clone(), forward.clone(), unused.clone()],
        &AnalysisConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(run_result.rounds.len(), 2);
    assert_eq!(
        run_result.rounds[0].report.status,
        VerificationStatus::NeedsIteration
    );
    let last = &run_result.rounds[1].report;
    assert_eq!(last.status, VerificationStatus::Complete);
    assert_eq!(last.closed.len(), 1);
    assert!(last.closed[0].missing.contains(&Subject::field("docs")));

    assert_eq!(
        run(&["verify", arg(&path), "--fixes", arg(&forward)]).await,
        ExitCode::Success
    );
    assert_eq!(
        run(&["verify", arg(&path), "--fixes", arg(&nothing)]).await,
        ExitCode::UnresolvedGaps
    );
}

#[tokio::test]
async fn test_yaml_fix_files() {
    let dir = TempDir::new().unwrap();
    let path = chain(&dir);
    let forward = write(
        &dir,
        "forward.yaml",
        r#"
- target: { component: responder }
  action: add
  subject: { field: docs }
  slot: passthrough
  rationale: forward retrieved documents to the validator
"#,
    );

    let set = commands::deliberate(&path, &forward, &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(set.verdicts[0].verdict, Verdict::Proceed);

    assert_eq!(
        run(&["verify", arg(&path), "--fixes", arg(&forward), "--format", "yaml"]).await,
        ExitCode::Success
    );
}

#[tokio::test]
async fn test_verify_against_saved_baseline() {
    let dir = TempDir::new().unwrap();
    let before = chain(&dir);
    let baseline = commands::analyze(&before, &AnalysisConfig::default())
        .await
        .unwrap();
    let saved = write(
        &dir,
        "baseline.json",
        &serde_json::to_string_pretty(&baseline).unwrap(),
    );

    let fixed = write(
        &dir,
        "fixed.yaml",
        &format!("{}{}", FIELDS, CHAIN).replace(
            "writes: [response], passthrough: []",
            "writes: [response], passthrough: [docs]",
        ),
    );

    let result = commands::verify(&fixed, Some(&saved), &[], &AnalysisConfig::default())
        .await
        .unwrap();
    assert_eq!(result.rounds.len(), 1);
    assert!(result.rounds[0].deliberation.is_none());
    assert_eq!(result.status(), VerificationStatus::Complete);

    assert_eq!(
        run(&["verify", arg(&before), "--baseline", arg(&saved)]).await,
        ExitCode::UnresolvedGaps
    );
}

#[tokio::test]
async fn test_budget_exhaustion_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = chain(&dir);
    let nothing = write(&dir, "noop.json", "[]");

    assert_eq!(
        run(&[
            "--max-iterations",
            "1",
            "verify",
            arg(&path),
            "--fixes",
            arg(&nothing),
            "--fixes",
            arg(&nothing),
        ])
        .await,
        ExitCode::BudgetExhausted
    );
}

#[tokio::test]
async fn test_cycle_divergence_exit_code() {
    let dir = TempDir::new().unwrap();
    let path = chain(&dir);
    let config = write(&dir, "topogap.yaml", "fixpoint_cap: 1\n");

    assert_eq!(
        run(&["--config", arg(&config), "analyze", arg(&path)]).await,
        ExitCode::CycleDivergence
    );
}

#[tokio::test]
async fn test_taxonomy_respects_config() {
    let dir = TempDir::new().unwrap();
    assert_eq!(run(&["taxonomy", "--format", "json"]).await, ExitCode::Success);

    let config = write(
        &dir,
        "topogap.toml",
        "[taxonomy]\ndisabled = [\"phantom-input\"]\norder = [\"lost-in-transit\"]\n",
    );
    assert_eq!(
        run(&["--config", arg(&config), "taxonomy"]).await,
        ExitCode::Success
    );

    let unknown = write(
        &dir,
        "unknown.toml",
        "[taxonomy]\ndisabled = [\"no-such-pattern\"]\n",
    );
    assert_eq!(
        run(&["--config", arg(&unknown), "taxonomy"]).await,
        ExitCode::InvalidInput
    );
}

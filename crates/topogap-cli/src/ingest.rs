//! Input loading
//!
//! Reads topology documents, fix lists, saved gap reports and the analysis
//! configuration. A topology path may be a single document or a directory
//! of fragments; fragments are read concurrently and merged in file-name
//! order so the resulting model does not depend on scheduling.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use topogap_core::{AnalysisConfig, Fix, GapReport, Topology, TopologyDocument};

use crate::error::CliError;

/// Extensions accepted for every input file
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["json", "yaml", "yml", "toml"];

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension(path).as_str())
}

async fn read(path: &Path) -> Result<String, CliError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::invalid_path(format!("{}: {}", path.display(), e)))
}

/// Supported documents directly inside `dir`, sorted by path
async fn fragments(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CliError::invalid_path(format!("{}: {}", dir.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_supported(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

async fn load_document(path: PathBuf) -> Result<TopologyDocument, CliError> {
    let content = read(&path).await?;
    let document = TopologyDocument::parse(&extension(&path), &content)?;
    debug!(
        path = %path.display(),
        components = document.components.len(),
        transitions = document.transitions.len(),
        "Parsed topology document"
    );
    Ok(document)
}

/// Load and validate a topology from a document or a directory of fragments
pub async fn load_topology(path: &Path) -> Result<Topology, CliError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| CliError::invalid_path(format!("{}: {}", path.display(), e)))?;

    let document = if metadata.is_dir() {
        let paths = fragments(path).await?;
        if paths.is_empty() {
            return Err(CliError::invalid_path(format!(
                "{}: no topology documents (expected one of: {})",
                path.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        // join_all yields results in input order
        let reads: Vec<_> = paths.into_iter().map(load_document).collect();
        let loaded = futures::future::join_all(reads).await;

        let mut merged = TopologyDocument::default();
        for fragment in loaded {
            merged.merge(fragment?);
        }
        merged
    } else {
        load_document(path.to_path_buf()).await?
    };

    let topology = document.into_topology()?;
    info!(
        path = %path.display(),
        components = topology.components().len(),
        transitions = topology.transitions().len(),
        "Topology ingested"
    );
    Ok(topology)
}

/// Fix files hold either a bare list or a `fixes` table (required for TOML)
#[derive(Deserialize)]
#[serde(untagged)]
enum FixFile {
    List(Vec<Fix>),
    Table { fixes: Vec<Fix> },
}

impl FixFile {
    fn into_fixes(self) -> Vec<Fix> {
        match self {
            FixFile::List(fixes) | FixFile::Table { fixes } => fixes,
        }
    }
}

/// Load a proposed fix list
pub async fn load_fixes(path: &Path) -> Result<Vec<Fix>, CliError> {
    let content = read(path).await?;
    let file: FixFile = match extension(path).as_str() {
        "json" => serde_json::from_str(&content)
            .map_err(|e| CliError::invalid_input(format!("{}: {}", path.display(), e)))?,
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| CliError::invalid_input(format!("{}: {}", path.display(), e)))?,
        "toml" => toml::from_str(&content)
            .map_err(|e| CliError::invalid_input(format!("{}: {}", path.display(), e)))?,
        other => {
            return Err(CliError::invalid_input(format!(
                "Unsupported fix file format: {}. Supported formats: {}",
                other,
                SUPPORTED_EXTENSIONS.join(", ")
            )))
        }
    };
    let fixes = file.into_fixes();
    debug!(path = %path.display(), fixes = fixes.len(), "Loaded fixes");
    Ok(fixes)
}

/// Load a gap report saved by `analyze --format json|yaml`
///
/// Both the bare report and the output envelope around it are accepted.
pub async fn load_baseline(path: &Path) -> Result<GapReport, CliError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Saved {
        Envelope { result: GapReport },
        Report(GapReport),
    }

    let content = read(path).await?;
    let saved: Saved = match extension(path).as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| CliError::invalid_input(format!("{}: {}", path.display(), e)))?,
        _ => serde_json::from_str(&content)
            .map_err(|e| CliError::invalid_input(format!("{}: {}", path.display(), e)))?,
    };
    Ok(match saved {
        Saved::Envelope { result } => result,
        Saved::Report(report) => report,
    })
}

/// Resolve the analysis configuration: file first, then flag overrides
pub async fn load_config(
    path: Option<&Path>,
    max_iterations: Option<usize>,
) -> Result<AnalysisConfig, CliError> {
    let mut config = match path {
        Some(path) => {
            let content = read(path).await?;
            AnalysisConfig::parse(&extension(path), &content)?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(max_iterations) = max_iterations {
        config = config.with_max_iterations(max_iterations);
    }
    config.validate()?;
    Ok(config)
}

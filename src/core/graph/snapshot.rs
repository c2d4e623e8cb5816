// src/core/graph/snapshot.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{CodeweaveError, Result};
use super::builder::DependencyGraph;
use super::component::Node;

/// Replace every non-alphanumeric character so a repo name is safe in a file name
pub fn sanitize_repo_name(repo_name: &str) -> String {
    repo_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// `<dir>/<sanitized repo>_dependency_graph.json`
pub fn snapshot_path(dir: &Path, repo_name: &str) -> PathBuf {
    dir.join(format!("{}_dependency_graph.json", sanitize_repo_name(repo_name)))
}

/// Write the component map as `{id: Node}` JSON, `depends_on` as arrays
pub fn save_snapshot(graph: &DependencyGraph, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CodeweaveError::file_system(parent, e))?;
    }

    let content = serde_json::to_string_pretty(graph.components())?;
    std::fs::write(path, content).map_err(|e| CodeweaveError::file_system(path, e))?;

    info!("Saved {} components to {}", graph.len(), path.display());
    Ok(())
}

/// Reload a snapshot written by `save_snapshot`
pub fn load_snapshot(path: &Path) -> Result<DependencyGraph> {
    let content = std::fs::read_to_string(path).map_err(|e| CodeweaveError::file_system(path, e))?;
    let raw: BTreeMap<String, Node> = serde_json::from_str(&content)?;

    let mut components = BTreeMap::new();
    for (key, node) in raw {
        if key != node.id {
            warn!("Snapshot key '{}' does not match component id '{}', using the id", key, node.id);
        }
        components.insert(node.id.clone(), node);
    }

    Ok(DependencyGraph::from_components(components))
}

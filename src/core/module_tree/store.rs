// src/core/module_tree/store.rs
use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::error::{CodeweaveError, Result};
use super::ModuleTree;

pub const FIRST_MODULE_TREE_FILENAME: &str = "first_module_tree.json";
pub const MODULE_TREE_FILENAME: &str = "module_tree.json";
pub const METADATA_FILENAME: &str = "metadata.json";

/// Reads and writes module trees under the docs directory.
///
/// `first_module_tree.json` holds the clustering result and is what a later
/// run resumes from; `module_tree.json` is the working copy handed to the
/// documentation driver.
#[derive(Debug, Clone)]
pub struct ModuleTreeStore {
    docs_dir: PathBuf,
}

impl ModuleTreeStore {
    pub fn new(docs_dir: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
        }
    }

    pub fn docs_dir(&self) -> &Path {
        &self.docs_dir
    }

    pub fn first_tree_path(&self) -> PathBuf {
        self.docs_dir.join(FIRST_MODULE_TREE_FILENAME)
    }

    pub fn working_tree_path(&self) -> PathBuf {
        self.docs_dir.join(MODULE_TREE_FILENAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.docs_dir.join(METADATA_FILENAME)
    }

    /// Load the clustering result of an earlier run, if any
    pub fn load_first(&self) -> Result<Option<ModuleTree>> {
        Self::load(&self.first_tree_path())
    }

    pub fn load_working(&self) -> Result<Option<ModuleTree>> {
        Self::load(&self.working_tree_path())
    }

    /// Persist an intermediate clustering result
    pub fn checkpoint(&self, tree: &ModuleTree) -> Result<()> {
        debug!("Checkpointing module tree ({} modules)", tree.module_count());
        Self::save(&self.first_tree_path(), tree)
    }

    /// Persist the final clustering result and seed the working copy with it
    pub fn save_final(&self, tree: &ModuleTree) -> Result<()> {
        Self::save(&self.first_tree_path(), tree)?;
        Self::save(&self.working_tree_path(), tree)?;
        info!(
            "Saved module tree with {} top-level modules to {}",
            tree.roots().len(),
            self.docs_dir.display()
        );
        Ok(())
    }

    pub fn save_metadata(&self, metadata: &DocumentationMetadata) -> Result<()> {
        let path = self.metadata_path();
        Self::ensure_parent(&path)?;
        let content = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&path, content).map_err(|e| CodeweaveError::file_system(&path, e))
    }

    fn load(path: &Path) -> Result<Option<ModuleTree>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| CodeweaveError::file_system(path, e))?;
        let tree = ModuleTree::from_json_str(&content)
            .map_err(|e| CodeweaveError::file_system(path, format!("invalid module tree: {}", e)))?;
        Ok(Some(tree))
    }

    fn save(path: &Path, tree: &ModuleTree) -> Result<()> {
        Self::ensure_parent(path)?;
        let content = tree.to_json_string()?;
        std::fs::write(path, content).map_err(|e| CodeweaveError::file_system(path, e))
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CodeweaveError::file_system(parent, e))?;
        }
        Ok(())
    }
}

/// Summary of a clustering run written next to the module trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentationMetadata {
    pub generation_info: GenerationInfo,
    pub statistics: TreeStatistics,
    pub files_generated: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub timestamp: String,
    pub main_model: String,
    pub cluster_model: String,
    pub generator_version: String,
    pub repo_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeStatistics {
    pub total_components: usize,
    pub leaf_nodes: usize,
    pub cluster_seeds: usize,
    pub modules: usize,
    pub leaf_modules: usize,
    pub max_tokens_per_module: usize,
    pub max_tokens_per_leaf_module: usize,
}

impl DocumentationMetadata {
    pub fn new(generation_info: GenerationInfo, statistics: TreeStatistics) -> Self {
        Self {
            generation_info,
            statistics,
            files_generated: vec![
                FIRST_MODULE_TREE_FILENAME.to_string(),
                MODULE_TREE_FILENAME.to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::module_tree::NewModule;

    fn tree() -> ModuleTree {
        let mut tree = ModuleTree::new();
        tree.insert_modules(
            &[],
            vec![NewModule {
                name: "core".to_string(),
                description: "Core".to_string(),
                components: ["a.A".to_string()].into_iter().collect(),
            }],
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_missing_tree_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModuleTreeStore::new(dir.path().join("docs"));
        assert!(store.load_first().unwrap().is_none());
    }

    #[test]
    fn test_save_final_writes_both_trees() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModuleTreeStore::new(dir.path().join("docs"));

        store.save_final(&tree()).unwrap();

        let first = store.load_first().unwrap().unwrap();
        let working = store.load_working().unwrap().unwrap();
        assert_eq!(first.to_persisted(), tree().to_persisted());
        assert_eq!(working.to_persisted(), tree().to_persisted());
    }

    #[test]
    fn test_corrupt_tree_is_a_file_system_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModuleTreeStore::new(dir.path());
        std::fs::write(store.first_tree_path(), "{not json").unwrap();

        assert!(matches!(store.load_first(), Err(CodeweaveError::FileSystem { .. })));
    }

    #[test]
    fn test_metadata_lists_tree_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModuleTreeStore::new(dir.path());
        let metadata = DocumentationMetadata::new(
            GenerationInfo {
                timestamp: "2024-01-01T00:00:00Z".to_string(),
                main_model: "main".to_string(),
                cluster_model: "cluster".to_string(),
                generator_version: "0.1.0".to_string(),
                repo_name: "demo".to_string(),
            },
            TreeStatistics {
                total_components: 3,
                leaf_nodes: 2,
                cluster_seeds: 2,
                modules: 1,
                leaf_modules: 1,
                max_tokens_per_module: 100,
                max_tokens_per_leaf_module: 50,
            },
        );

        store.save_metadata(&metadata).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.metadata_path()).unwrap()).unwrap();
        assert_eq!(raw["files_generated"][0], "first_module_tree.json");
        assert_eq!(raw["statistics"]["leaf_nodes"], 2);
    }
}

// src/core/module_tree/mod.rs
//! Hierarchical module tree produced by clustering.
//!
//! Entries live in a flat arena and refer to their children by index, so a
//! subtree can be located by path and extended without touching siblings.

mod store;

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

pub use store::{DocumentationMetadata, GenerationInfo, ModuleTreeStore, TreeStatistics};

pub type ModuleId = usize;

/// One named module in the tree
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleEntry {
    pub name: String,
    pub description: String,
    /// Names of the ancestors, root first, excluding this module
    pub path: Vec<String>,
    pub components: BTreeSet<String>,
    pub children: BTreeMap<String, ModuleId>,
}

impl ModuleEntry {
    /// Path including this module's own name
    pub fn full_path(&self) -> Vec<String> {
        let mut full = self.path.clone();
        full.push(self.name.clone());
        full
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A module to be inserted under some parent
#[derive(Debug, Clone, PartialEq)]
pub struct NewModule {
    pub name: String,
    pub description: String,
    pub components: BTreeSet<String>,
}

/// On-disk shape of a module: `{description, components, children}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedModule {
    pub description: String,
    pub components: Vec<String>,
    pub children: BTreeMap<String, PersistedModule>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleTree {
    entries: Vec<ModuleEntry>,
    roots: BTreeMap<String, ModuleId>,
    /// Slots of replaced subtrees, reused before the arena grows
    free: Vec<ModuleId>,
}

impl ModuleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Top-level modules by name
    pub fn roots(&self) -> &BTreeMap<String, ModuleId> {
        &self.roots
    }

    pub fn get(&self, id: ModuleId) -> Option<&ModuleEntry> {
        self.entries.get(id)
    }

    /// Locate a module by its full path
    pub fn find(&self, path: &[String]) -> Option<ModuleId> {
        let (first, rest) = path.split_first()?;
        let mut current = *self.roots.get(first)?;
        for segment in rest {
            current = *self.entries.get(current)?.children.get(segment)?;
        }
        Some(current)
    }

    /// Insert `modules` as children of the module at `parent_path`, or at the
    /// root level when the path is empty. A module whose name already exists
    /// at that level replaces the old one, subtree included.
    ///
    /// Returns `None` if `parent_path` does not name an existing module.
    pub fn insert_modules(&mut self, parent_path: &[String], modules: Vec<NewModule>) -> Option<Vec<ModuleId>> {
        let parent = if parent_path.is_empty() {
            None
        } else {
            Some(self.find(parent_path)?)
        };

        let mut inserted = Vec::with_capacity(modules.len());
        for module in modules {
            let existing = match parent {
                Some(p) => self.entries[p].children.get(&module.name).copied(),
                None => self.roots.get(&module.name).copied(),
            };

            let entry = ModuleEntry {
                name: module.name.clone(),
                description: module.description,
                path: parent_path.to_vec(),
                components: module.components,
                children: BTreeMap::new(),
            };

            let id = match existing {
                Some(id) => {
                    self.release_descendants(id);
                    self.entries[id] = entry;
                    id
                }
                None => self.allocate(entry),
            };

            match parent {
                Some(p) => {
                    self.entries[p].children.insert(module.name, id);
                }
                None => {
                    self.roots.insert(module.name, id);
                }
            }
            inserted.push(id);
        }

        Some(inserted)
    }

    fn allocate(&mut self, entry: ModuleEntry) -> ModuleId {
        match self.free.pop() {
            Some(id) => {
                self.entries[id] = entry;
                id
            }
            None => {
                self.entries.push(entry);
                self.entries.len() - 1
            }
        }
    }

    /// Return every slot below `id` to the free list
    fn release_descendants(&mut self, id: ModuleId) {
        let mut stack: Vec<ModuleId> = self.entries[id].children.values().copied().collect();
        while let Some(child) = stack.pop() {
            let entry = &mut self.entries[child];
            stack.extend(entry.children.values().copied());
            entry.children.clear();
            entry.components.clear();
            self.free.push(child);
        }
    }

    /// Every reachable module, parents before children
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleEntry)> {
        let mut stack: Vec<ModuleId> = self.roots.values().rev().copied().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let entry = &self.entries[id];
            stack.extend(entry.children.values().rev().copied());
            Some((id, entry))
        })
    }

    pub fn module_count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_leaf_module(&self, id: ModuleId) -> bool {
        self.entries.get(id).map(ModuleEntry::is_leaf).unwrap_or(false)
    }

    /// Modules without children
    pub fn leaf_modules(&self) -> Vec<ModuleId> {
        self.iter().filter(|(_, entry)| entry.is_leaf()).map(|(id, _)| id).collect()
    }

    /// Full paths in the order documentation should be written: every
    /// module after all of its children
    pub fn processing_order(&self) -> Vec<Vec<String>> {
        fn visit(tree: &ModuleTree, id: ModuleId, order: &mut Vec<Vec<String>>) {
            let entry = &tree.entries[id];
            for &child in entry.children.values() {
                visit(tree, child, order);
            }
            order.push(entry.full_path());
        }

        let mut order = Vec::new();
        for &root in self.roots.values() {
            visit(self, root, &mut order);
        }
        order
    }

    pub fn to_persisted(&self) -> BTreeMap<String, PersistedModule> {
        fn persist(tree: &ModuleTree, id: ModuleId) -> PersistedModule {
            let entry = &tree.entries[id];
            PersistedModule {
                description: entry.description.clone(),
                components: entry.components.iter().cloned().collect(),
                children: entry
                    .children
                    .iter()
                    .map(|(name, &child)| (name.clone(), persist(tree, child)))
                    .collect(),
            }
        }

        self.roots
            .iter()
            .map(|(name, &id)| (name.clone(), persist(self, id)))
            .collect()
    }

    pub fn from_persisted(modules: &BTreeMap<String, PersistedModule>) -> Self {
        fn restore(tree: &mut ModuleTree, path: &[String], modules: &BTreeMap<String, PersistedModule>) {
            let new_modules = modules
                .iter()
                .map(|(name, module)| NewModule {
                    name: name.clone(),
                    description: module.description.clone(),
                    components: module.components.iter().cloned().collect(),
                })
                .collect();
            // The parent was inserted just before recursing, so the path exists
            if tree.insert_modules(path, new_modules).is_none() {
                return;
            }

            for (name, module) in modules {
                if !module.children.is_empty() {
                    let mut child_path = path.to_vec();
                    child_path.push(name.clone());
                    restore(tree, &child_path, &module.children);
                }
            }
        }

        let mut tree = ModuleTree::new();
        restore(&mut tree, &[], modules);
        tree
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_persisted())
    }

    pub fn from_json_str(content: &str) -> serde_json::Result<Self> {
        let modules: BTreeMap<String, PersistedModule> = serde_json::from_str(content)?;
        Ok(Self::from_persisted(&modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, components: &[&str]) -> NewModule {
        NewModule {
            name: name.to_string(),
            description: format!("{} module", name),
            components: components.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn sample_tree() -> ModuleTree {
        let mut tree = ModuleTree::new();
        tree.insert_modules(&[], vec![module("core", &["a.A", "a.B"]), module("util", &["u.X", "u.Y"])])
            .unwrap();
        tree.insert_modules(&path(&["util"]), vec![module("strings", &["u.X"]), module("math", &["u.Y"])])
            .unwrap();
        tree
    }

    #[test]
    fn test_paths_follow_position() {
        let tree = sample_tree();
        let id = tree.find(&path(&["util", "math"])).unwrap();
        let entry = tree.get(id).unwrap();

        assert_eq!(entry.path, path(&["util"]));
        assert_eq!(entry.full_path(), path(&["util", "math"]));
        assert!(tree.find(&path(&["util", "nope"])).is_none());
        assert_eq!(tree.module_count(), 4);
    }

    #[test]
    fn test_merge_only_touches_target_subtree() {
        let mut tree = sample_tree();
        let util_before = serde_json::to_string(&tree.to_persisted()["util"]).unwrap();

        tree.insert_modules(&path(&["core"]), vec![module("models", &["a.A"]), module("views", &["a.B"])])
            .unwrap();

        let persisted = tree.to_persisted();
        assert_eq!(serde_json::to_string(&persisted["util"]).unwrap(), util_before);
        assert_eq!(persisted["core"].children.len(), 2);
        assert_eq!(persisted["core"].components, vec!["a.A", "a.B"]);
    }

    #[test]
    fn test_replacing_a_subtree_reuses_its_slots() {
        let mut tree = sample_tree();
        assert_eq!(tree.entries.len(), 4);

        // `util` is replaced, its two children become free slots
        tree.insert_modules(&[], vec![module("util", &["u.X", "u.Y"])]).unwrap();
        assert_eq!(tree.module_count(), 2);
        assert_eq!(tree.free.len(), 2);

        tree.insert_modules(&path(&["util"]), vec![module("text", &["u.X"]), module("numbers", &["u.Y"])])
            .unwrap();
        assert_eq!(tree.entries.len(), 4);
        assert!(tree.free.is_empty());
        assert_eq!(tree.module_count(), 4);
        assert!(tree.find(&path(&["util", "strings"])).is_none());
        assert_eq!(tree.get(tree.find(&path(&["util", "numbers"])).unwrap()).unwrap().path, path(&["util"]));
    }

    #[test]
    fn test_insert_under_missing_parent_fails() {
        let mut tree = sample_tree();
        assert!(tree.insert_modules(&path(&["ghost"]), vec![module("x", &[])]).is_none());
        assert_eq!(tree.module_count(), 4);
    }

    #[test]
    fn test_processing_order_puts_children_first() {
        let tree = sample_tree();
        assert_eq!(
            tree.processing_order(),
            vec![
                path(&["core"]),
                path(&["util", "math"]),
                path(&["util", "strings"]),
                path(&["util"]),
            ]
        );

        let leaves: Vec<String> = tree
            .leaf_modules()
            .into_iter()
            .map(|id| tree.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(leaves, vec!["core", "math", "strings"]);
    }

    #[test]
    fn test_json_reload_ignores_path_field() {
        let json = r#"{
            "core": {
                "description": "Core types",
                "path": ["bogus"],
                "components": ["a.A"],
                "children": {
                    "models": {"description": "Models", "components": ["a.A"], "children": {}}
                }
            },
            "cli": {"description": "Entry points", "components": ["c.Main"]}
        }"#;

        let tree = ModuleTree::from_json_str(json).unwrap();
        let models = tree.get(tree.find(&path(&["core", "models"])).unwrap()).unwrap();
        assert_eq!(models.path, path(&["core"]));
        assert!(tree.is_leaf_module(tree.find(&path(&["cli"])).unwrap()));

        let reloaded = ModuleTree::from_json_str(&tree.to_json_string().unwrap()).unwrap();
        assert_eq!(reloaded.to_persisted(), tree.to_persisted());
    }
}

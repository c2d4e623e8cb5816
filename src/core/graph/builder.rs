// src/core/graph/builder.rs
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use super::analysis::{DecodedAnalysis, RawComponentRecord, RawEdgeRecord};
use super::component::{ComponentType, Node};

/// Lookup table from every accepted spelling of a component id to its
/// canonical id, plus a name index for best-effort callee resolution
#[derive(Debug, Clone, Default)]
pub struct ResolutionIndex {
    ids: HashMap<String, String>,
    /// Bare name -> canonical ids, in record order
    by_name: HashMap<String, Vec<String>>,
}

/// How a callee reference was matched to a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Matched a canonical or legacy id
    Id(String),
    /// Matched by bare name; `candidates` is how many components share it
    Name { id: String, candidates: usize },
}

impl Resolution {
    pub fn id(&self) -> &str {
        match self {
            Resolution::Id(id) | Resolution::Name { id, .. } => id,
        }
    }
}

impl ResolutionIndex {
    fn register(&mut self, node: &Node) {
        self.ids.insert(node.id.clone(), node.id.clone());

        let legacy = node.legacy_id();
        if legacy != node.id {
            self.ids.entry(legacy).or_insert_with(|| node.id.clone());
        }

        let name = node.name.trim();
        if !name.is_empty() {
            self.by_name.entry(name.to_string()).or_default().push(node.id.clone());
        }
    }

    /// Resolve a canonical or legacy id
    pub fn resolve(&self, key: &str) -> Option<&str> {
        self.ids.get(key).map(String::as_str)
    }

    /// Resolve an id, falling back to the first component with that bare name
    pub fn resolve_callee(&self, key: &str) -> Option<Resolution> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        if let Some(id) = self.resolve(key) {
            return Some(Resolution::Id(id.to_string()));
        }

        self.by_name.get(key).and_then(|ids| {
            ids.first().map(|first| Resolution::Name {
                id: first.clone(),
                candidates: ids.len(),
            })
        })
    }
}

/// Edge whose callee was resolved by name while several components share it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousEdge {
    pub caller: String,
    pub callee_name: String,
    pub chosen: String,
    pub candidates: usize,
}

/// Diagnostics gathered while building the graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    /// Records that failed to decode
    pub malformed_records: usize,
    /// Component records with a missing or blank id
    pub missing_ids: usize,
    /// Component records repeating an id seen earlier
    pub duplicate_ids: usize,
    /// Relationships whose caller is not a known component
    pub unknown_callers: usize,
    /// Relationships whose callee matched neither an id nor a name
    pub unknown_callees: usize,
    /// Relationships that resolved back onto their own caller
    pub self_references: usize,
    /// Relationships repeating an edge that was already present
    pub duplicate_edges: usize,
    pub ambiguous_edges: Vec<AmbiguousEdge>,
}

impl BuildReport {
    pub fn skipped_components(&self) -> usize {
        self.malformed_records + self.missing_ids + self.duplicate_ids
    }

    pub fn skipped_edges(&self) -> usize {
        self.unknown_callers + self.unknown_callees + self.self_references
    }
}

/// Component map plus the directed dependency edges stored in `depends_on`
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    components: BTreeMap<String, Node>,
    index: ResolutionIndex,
    edge_count: usize,
    modules: BTreeSet<String>,
    report: BuildReport,
}

impl DependencyGraph {
    /// Rebuild a graph around an existing component map, e.g. a reloaded
    /// snapshot. Dependencies on unknown ids and self references are dropped.
    pub fn from_components(mut components: BTreeMap<String, Node>) -> Self {
        let known: BTreeSet<String> = components.keys().cloned().collect();
        let mut index = ResolutionIndex::default();
        let mut modules = BTreeSet::new();
        let mut report = BuildReport::default();
        let mut edge_count = 0;

        for (id, node) in components.iter_mut() {
            let before = node.depends_on.len();
            node.depends_on.retain(|dep| dep != id && known.contains(dep));
            report.unknown_callees += before - node.depends_on.len();
            edge_count += node.depends_on.len();

            index.register(node);
            if let Some(module) = node.module_path() {
                modules.insert(module.to_string());
            }
        }

        Self {
            components,
            index,
            edge_count,
            modules,
            report,
        }
    }

    pub fn components(&self) -> &BTreeMap<String, Node> {
        &self.components
    }

    pub fn into_components(self) -> BTreeMap<String, Node> {
        self.components
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.components.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    pub fn index(&self) -> &ResolutionIndex {
        &self.index
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Distinct module paths (ids minus their final segment)
    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Direct dependencies of a component
    pub fn dependencies(&self, id: &str) -> impl Iterator<Item = &str> {
        self.components
            .get(id)
            .into_iter()
            .flat_map(|node| node.depends_on.iter().map(String::as_str))
    }
}

/// Turns analyzer records into a `DependencyGraph`
pub struct GraphBuilder;

impl GraphBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build from a decoded analyzer document, carrying over its decode failures
    pub fn build_from_analysis(&self, analysis: &DecodedAnalysis) -> DependencyGraph {
        let mut graph = self.build(&analysis.functions, &analysis.relationships);
        graph.report.malformed_records += analysis.malformed_records;
        graph
    }

    /// Build the component map and insert every resolvable relationship
    pub fn build(
        &self,
        functions: &[RawComponentRecord],
        relationships: &[RawEdgeRecord],
    ) -> DependencyGraph {
        let mut graph = DependencyGraph::default();

        // First pass: components and their id aliases
        for record in functions {
            let Some(node) = self.node_from_record(record) else {
                debug!("Skipping component record without id: {:?}", record.name);
                graph.report.missing_ids += 1;
                continue;
            };

            if graph.components.contains_key(&node.id) {
                warn!("Duplicate component id '{}', keeping the first definition", node.id);
                graph.report.duplicate_ids += 1;
                continue;
            }

            graph.index.register(&node);
            if let Some(module) = node.module_path() {
                graph.modules.insert(module.to_string());
            }
            graph.components.insert(node.id.clone(), node);
        }

        // Second pass: relationships
        for relationship in relationships {
            self.insert_relationship(&mut graph, relationship);
        }

        let report = &graph.report;
        info!(
            "Built dependency graph: {} components, {} edges ({} components skipped, {} edges skipped, {} ambiguous)",
            graph.components.len(),
            graph.edge_count,
            report.skipped_components(),
            report.skipped_edges(),
            report.ambiguous_edges.len()
        );

        graph
    }

    fn insert_relationship(&self, graph: &mut DependencyGraph, relationship: &RawEdgeRecord) {
        let caller_key = relationship.caller.as_deref().unwrap_or_default().trim();
        if caller_key.is_empty() {
            graph.report.unknown_callers += 1;
            return;
        }
        let Some(caller) = graph.index.resolve(caller_key).map(str::to_string) else {
            graph.report.unknown_callers += 1;
            return;
        };

        let callee_key = relationship.callee.as_deref().unwrap_or_default().trim();
        if callee_key.is_empty() {
            graph.report.unknown_callees += 1;
            return;
        }
        let Some(resolution) = graph.index.resolve_callee(callee_key) else {
            graph.report.unknown_callees += 1;
            return;
        };

        let callee = resolution.id().to_string();
        if callee == caller {
            graph.report.self_references += 1;
            return;
        }

        if let Resolution::Name { candidates, .. } = resolution {
            if candidates > 1 {
                debug!(
                    "Callee '{}' of '{}' matched {} components by name, using '{}'",
                    callee_key, caller, candidates, callee
                );
                graph.report.ambiguous_edges.push(AmbiguousEdge {
                    caller: caller.clone(),
                    callee_name: callee_key.to_string(),
                    chosen: callee.clone(),
                    candidates,
                });
            }
        }

        let Some(node) = graph.components.get_mut(&caller) else {
            graph.report.unknown_callers += 1;
            return;
        };

        if node.depends_on.insert(callee) {
            graph.edge_count += 1;
        } else {
            graph.report.duplicate_edges += 1;
        }
    }

    fn node_from_record(&self, record: &RawComponentRecord) -> Option<Node> {
        let id = record.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;

        let name = record.name.clone().unwrap_or_default();
        let docstring = record.docstring.clone().unwrap_or_default();
        let display_name = record
            .display_name
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| name.clone());

        Some(Node {
            id: id.to_string(),
            display_name,
            component_type: ComponentType::from_label(record.type_label()),
            file_path: PathBuf::from(record.file_path.clone().unwrap_or_default()),
            relative_path: record.relative_path.clone().unwrap_or_default(),
            start_line: record.start_line.unwrap_or(0),
            end_line: record.end_line.unwrap_or(0),
            source_code: record.source().to_string(),
            has_docstring: record.has_docstring.unwrap_or(!docstring.is_empty()),
            docstring,
            parameters: record.parameter_names(),
            base_classes: record.base_classes.clone(),
            class_name: record.class_name.clone(),
            depends_on: BTreeSet::new(),
            name,
        })
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::record;

    #[test]
    fn test_builds_edges_between_known_components() {
        let functions = vec![record("pkg.a.A", "A", "pkg/a.py"), record("pkg.b.B", "B", "pkg/b.py")];
        let relationships = vec![
            RawEdgeRecord::new("pkg.a.A", "pkg.b.B"),
            RawEdgeRecord::new("pkg.a.A", "pkg.b.B"),
        ];

        let graph = GraphBuilder::new().build(&functions, &relationships);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.report().duplicate_edges, 1);
        assert!(graph.get("pkg.a.A").unwrap().depends_on.contains("pkg.b.B"));
        assert!(graph.get("pkg.b.B").unwrap().depends_on.is_empty());
        assert!(graph.modules().contains("pkg.a"));
    }

    #[test]
    fn test_dangling_edges_are_dropped() {
        let functions = vec![record("pkg.a.A", "A", "pkg/a.py")];
        let relationships = vec![
            RawEdgeRecord::new("pkg.a.A", "os.path.join"),
            RawEdgeRecord::new("unknown.Caller", "pkg.a.A"),
        ];

        let graph = GraphBuilder::new().build(&functions, &relationships);

        assert!(graph.components().values().all(|node| node.depends_on.is_empty()));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.report().unknown_callees, 1);
        assert_eq!(graph.report().unknown_callers, 1);
    }

    #[test]
    fn test_blank_endpoints_never_match_nameless_components() {
        let mut lambda = record("pkg.anon.Lambda", "", "pkg/anon.py");
        lambda.name = None;
        let functions = vec![record("pkg.a.A", "A", "pkg/a.py"), lambda];
        let relationships = vec![
            RawEdgeRecord { callee: None, ..RawEdgeRecord::new("pkg.a.A", "") },
            RawEdgeRecord::new("pkg.a.A", "   "),
            RawEdgeRecord { caller: None, ..RawEdgeRecord::new("", "pkg.anon.Lambda") },
        ];

        let graph = GraphBuilder::new().build(&functions, &relationships);

        assert!(graph.get("pkg.a.A").unwrap().depends_on.is_empty());
        assert!(graph.get("pkg.a.A").unwrap().is_leaf());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.report().unknown_callees, 2);
        assert_eq!(graph.report().unknown_callers, 1);
        assert!(graph.index().resolve_callee("").is_none());
    }

    #[test]
    fn test_missing_and_duplicate_ids_are_skipped() {
        let mut blank = record("", "Blank", "x.py");
        blank.id = Some("   ".to_string());
        let mut missing = record("", "Missing", "x.py");
        missing.id = None;
        let functions = vec![
            record("pkg.a.A", "A", "pkg/a.py"),
            blank,
            missing,
            record("pkg.a.A", "A2", "pkg/a.py"),
        ];

        let graph = GraphBuilder::new().build(&functions, &[]);

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("pkg.a.A").unwrap().name, "A");
        assert_eq!(graph.report().missing_ids, 2);
        assert_eq!(graph.report().duplicate_ids, 1);
        assert_eq!(graph.report().skipped_components(), 3);
    }

    #[test]
    fn test_legacy_ids_resolve_to_canonical() {
        let functions = vec![record("pkg.a.A", "A", "pkg/a.py"), record("pkg.b.B", "B", "pkg/b.py")];
        let relationships = vec![RawEdgeRecord::new("/repo/pkg/a.py:A", "/repo/pkg/b.py:B")];

        let graph = GraphBuilder::new().build(&functions, &relationships);

        assert_eq!(graph.index().resolve("/repo/pkg/a.py:A"), Some("pkg.a.A"));
        assert!(graph.get("pkg.a.A").unwrap().depends_on.contains("pkg.b.B"));
    }

    #[test]
    fn test_name_fallback_prefers_first_and_flags_ambiguity() {
        let functions = vec![
            record("pkg.a.A", "A", "pkg/a.py"),
            record("pkg.x.Helper", "Helper", "pkg/x.py"),
            record("pkg.y.Helper", "Helper", "pkg/y.py"),
            record("pkg.z.Unique", "Unique", "pkg/z.py"),
        ];
        let relationships = vec![
            RawEdgeRecord::new("pkg.a.A", "Helper"),
            RawEdgeRecord::new("pkg.a.A", "Unique"),
        ];

        let graph = GraphBuilder::new().build(&functions, &relationships);
        let deps = &graph.get("pkg.a.A").unwrap().depends_on;

        assert!(deps.contains("pkg.x.Helper"));
        assert!(!deps.contains("pkg.y.Helper"));
        assert!(deps.contains("pkg.z.Unique"));
        assert_eq!(
            graph.report().ambiguous_edges,
            vec![AmbiguousEdge {
                caller: "pkg.a.A".to_string(),
                callee_name: "Helper".to_string(),
                chosen: "pkg.x.Helper".to_string(),
                candidates: 2,
            }]
        );
    }

    #[test]
    fn test_recursive_calls_are_not_self_edges() {
        let functions = vec![record("pkg.a.walk", "walk", "pkg/a.py")];
        let relationships = vec![
            RawEdgeRecord::new("pkg.a.walk", "pkg.a.walk"),
            RawEdgeRecord::new("pkg.a.walk", "walk"),
        ];

        let graph = GraphBuilder::new().build(&functions, &relationships);

        assert!(graph.get("pkg.a.walk").unwrap().depends_on.is_empty());
        assert_eq!(graph.report().self_references, 2);
    }

    #[test]
    fn test_from_components_drops_dangling_dependencies() {
        let functions = vec![record("pkg.a.A", "A", "pkg/a.py"), record("pkg.b.B", "B", "pkg/b.py")];
        let mut components = GraphBuilder::new().build(&functions, &[]).into_components();
        let a = components.get_mut("pkg.a.A").unwrap();
        a.depends_on.insert("pkg.b.B".to_string());
        a.depends_on.insert("gone.Missing".to_string());
        a.depends_on.insert("pkg.a.A".to_string());

        let graph = DependencyGraph::from_components(components);

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependencies("pkg.a.A").collect::<Vec<_>>(), vec!["pkg.b.B"]);
        assert_eq!(graph.index().resolve("/repo/pkg/b.py:B"), Some("pkg.b.B"));
    }
}

// src/core/graph/cycles.rs
use std::collections::{BTreeSet, HashMap};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Serialize, Deserialize};

use super::builder::DependencyGraph;

/// A vertex of the condensed graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderingUnit {
    /// A component outside any cycle
    Component(String),
    /// A strongly connected component of two or more members, sorted by id
    Cycle(Vec<String>),
}

impl OrderingUnit {
    /// Lexicographically smallest member id, used for tie-breaking
    pub fn key(&self) -> &str {
        match self {
            OrderingUnit::Component(id) => id,
            OrderingUnit::Cycle(members) => members.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn members(&self) -> &[String] {
        match self {
            OrderingUnit::Component(id) => std::slice::from_ref(id),
            OrderingUnit::Cycle(members) => members,
        }
    }
}

/// Dependency graph with every strongly connected component collapsed
/// into a single unit. Always acyclic.
#[derive(Debug, Clone, Default)]
pub struct CondensedGraph {
    units: Vec<OrderingUnit>,
    /// Component id -> index into `units`
    unit_of: HashMap<String, usize>,
    /// Unit -> units it depends on
    dependencies: Vec<BTreeSet<usize>>,
}

impl CondensedGraph {
    pub fn unit(&self, index: usize) -> &OrderingUnit {
        &self.units[index]
    }

    pub fn unit_of(&self, id: &str) -> Option<usize> {
        self.unit_of.get(id).copied()
    }

    /// Units that `index` depends on
    pub fn dependencies(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependencies[index]
    }

    /// Only the collapsed cycles
    pub fn cycles(&self) -> impl Iterator<Item = &[String]> {
        self.units.iter().filter_map(|unit| match unit {
            OrderingUnit::Cycle(members) => Some(members.as_slice()),
            OrderingUnit::Component(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Collapse strongly connected components so the result is a DAG
pub fn resolve_cycles(graph: &DependencyGraph) -> CondensedGraph {
    let mut digraph: DiGraph<&str, ()> = DiGraph::new();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::with_capacity(graph.len());

    for id in graph.components().keys() {
        index_of.insert(id.as_str(), digraph.add_node(id.as_str()));
    }

    for (id, node) in graph.components() {
        let from = index_of[id.as_str()];
        for dep in &node.depends_on {
            // Dependencies are validated at build time; skip anything stale
            if let Some(&to) = index_of.get(dep.as_str()) {
                if from != to {
                    digraph.add_edge(from, to, ());
                }
            }
        }
    }

    let mut units = Vec::new();
    let mut unit_of = HashMap::with_capacity(graph.len());

    for scc in tarjan_scc(&digraph) {
        let mut members: Vec<String> = scc.iter().map(|&idx| digraph[idx].to_string()).collect();
        members.sort();

        let unit_index = units.len();
        for member in &members {
            unit_of.insert(member.clone(), unit_index);
        }

        if members.len() == 1 {
            units.push(OrderingUnit::Component(members.remove(0)));
        } else {
            units.push(OrderingUnit::Cycle(members));
        }
    }

    let mut dependencies = vec![BTreeSet::new(); units.len()];
    for (id, node) in graph.components() {
        let from = unit_of[id];
        for dep in &node.depends_on {
            if let Some(&to) = unit_of.get(dep) {
                if to != from {
                    dependencies[from].insert(to);
                }
            }
        }
    }

    CondensedGraph {
        units,
        unit_of,
        dependencies,
    }
}

// src/core/graph/ordering.rs
//! Leaf detection and dependency-first ordering over the condensed graph.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet, VecDeque};
use tracing::{debug, warn};

use super::builder::DependencyGraph;
use super::cycles::{CondensedGraph, OrderingUnit};

/// Identifier fragments the analyzers use when they emit an error in place of an id
const ERROR_MARKERS: [&str; 4] = ["error", "exception", "failed", "invalid"];

/// Components with no outgoing dependencies
pub fn find_leaf_nodes(graph: &DependencyGraph) -> BTreeSet<String> {
    graph
        .components()
        .values()
        .filter(|node| node.is_leaf())
        .map(|node| node.id.clone())
        .collect()
}

/// Narrow leaf nodes to the ones worth clustering.
///
/// Drops identifiers that look like analyzer error strings and keeps the
/// components whose type is in `seed_types`. When that filter leaves
/// nothing, every well-formed leaf is returned instead.
pub fn select_cluster_seeds(
    graph: &DependencyGraph,
    leaves: &BTreeSet<String>,
    seed_types: &[String],
) -> Vec<String> {
    let well_formed: Vec<&String> = leaves
        .iter()
        .filter(|id| {
            let lower = id.to_lowercase();
            let looks_broken = id.trim().is_empty() || ERROR_MARKERS.iter().any(|m| lower.contains(m));
            if looks_broken {
                warn!("Skipping invalid leaf node identifier: '{}'", id);
            }
            !looks_broken && graph.contains(id)
        })
        .collect();

    let seeds: Vec<String> = well_formed
        .iter()
        .filter(|id| {
            graph
                .get(id)
                .map(|node| seed_types.iter().any(|t| t == node.component_type.as_str()))
                .unwrap_or(false)
        })
        .map(|id| id.to_string())
        .collect();

    if seeds.is_empty() && !well_formed.is_empty() {
        warn!(
            "No leaf nodes of type {:?}; clustering all {} leaf nodes instead",
            seed_types,
            well_formed.len()
        );
        return well_formed.into_iter().cloned().collect();
    }

    debug!("Selected {} clustering seeds from {} leaf nodes", seeds.len(), leaves.len());
    seeds
}

/// Kahn's algorithm over the condensed graph, dependencies first.
///
/// Among units whose dependencies have all been emitted, the one with the
/// smallest id goes next, so the order is fully deterministic.
pub fn topological_sort(condensed: &CondensedGraph) -> Vec<OrderingUnit> {
    let unit_count = condensed.len();
    let mut remaining: Vec<usize> = (0..unit_count)
        .map(|i| condensed.dependencies(i).len())
        .collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); unit_count];
    for unit in 0..unit_count {
        for &dep in condensed.dependencies(unit) {
            dependents[dep].push(unit);
        }
    }

    let mut ready: BinaryHeap<Reverse<(&str, usize)>> = (0..unit_count)
        .filter(|&i| remaining[i] == 0)
        .map(|i| Reverse((condensed.unit(i).key(), i)))
        .collect();

    let mut order = Vec::with_capacity(unit_count);
    while let Some(Reverse((_, unit))) = ready.pop() {
        order.push(condensed.unit(unit).clone());

        for &dependent in &dependents[unit] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(Reverse((condensed.unit(dependent).key(), dependent)));
            }
        }
    }

    order
}

/// Flatten ordering units into component ids; cycle members come out sorted
pub fn expand_order(units: &[OrderingUnit]) -> Vec<String> {
    units
        .iter()
        .flat_map(|unit| unit.members().iter().cloned())
        .collect()
}

/// Dependency-first order of every component in the graph
pub fn dependency_order(graph: &DependencyGraph) -> Vec<String> {
    let condensed = super::cycles::resolve_cycles(graph);
    expand_order(&topological_sort(&condensed))
}

/// Lazy depth-first post-order walk of the condensed graph.
///
/// Yields component ids so that every component comes after everything it
/// depends on, without materialising the order. Roots and dependencies are
/// visited in ascending id order. The sequence satisfies the same
/// dependency-first guarantee as `topological_sort` but is not the same
/// sequence: a root's dependencies are emitted right before it, whereas
/// Kahn's order always picks the smallest ready id.
pub struct DependencyFirstTraversal<'a> {
    condensed: &'a CondensedGraph,
    roots: Vec<usize>,
    next_root: usize,
    visited: HashSet<usize>,
    /// (unit, dependencies in visit order, next dependency to visit)
    stack: Vec<(usize, Vec<usize>, usize)>,
    pending: VecDeque<String>,
}

impl<'a> DependencyFirstTraversal<'a> {
    pub fn new(condensed: &'a CondensedGraph) -> Self {
        let mut roots: Vec<usize> = (0..condensed.len()).collect();
        roots.sort_by(|&a, &b| condensed.unit(a).key().cmp(condensed.unit(b).key()));

        Self {
            condensed,
            roots,
            next_root: 0,
            visited: HashSet::new(),
            stack: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    fn push_unit(&mut self, unit: usize) {
        self.visited.insert(unit);
        let mut deps: Vec<usize> = self.condensed.dependencies(unit).iter().copied().collect();
        deps.sort_by(|&a, &b| self.condensed.unit(a).key().cmp(self.condensed.unit(b).key()));
        self.stack.push((unit, deps, 0));
    }
}

impl<'a> Iterator for DependencyFirstTraversal<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(id) = self.pending.pop_front() {
                return Some(id);
            }

            if let Some((unit, deps, cursor)) = self.stack.last_mut() {
                if *cursor < deps.len() {
                    let dep = deps[*cursor];
                    *cursor += 1;
                    if !self.visited.contains(&dep) {
                        self.push_unit(dep);
                    }
                } else {
                    let unit = *unit;
                    self.stack.pop();
                    self.pending.extend(self.condensed.unit(unit).members().iter().cloned());
                }
                continue;
            }

            // Stack drained: start from the next unvisited root
            while self.next_root < self.roots.len() && self.visited.contains(&self.roots[self.next_root]) {
                self.next_root += 1;
            }
            let root = *self.roots.get(self.next_root)?;
            self.push_unit(root);
        }
    }
}

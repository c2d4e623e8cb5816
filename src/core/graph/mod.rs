// src/core/graph/mod.rs
//! Dependency graph engine
//!
//! Turns the structural analyzer's component and relationship records into
//! a component map, collapses call cycles, and produces the dependency-first
//! ordering and leaf set that module clustering starts from.

mod analysis;
mod builder;
mod component;
mod cycles;
mod ordering;
mod snapshot;

pub use analysis::{AnalysisOutput, DecodedAnalysis, RawComponentRecord, RawEdgeRecord};
pub use builder::{AmbiguousEdge, BuildReport, DependencyGraph, GraphBuilder, Resolution, ResolutionIndex};
pub use component::{ComponentType, Node};
pub use cycles::{resolve_cycles, CondensedGraph, OrderingUnit};
pub use ordering::{
    dependency_order, expand_order, find_leaf_nodes, select_cluster_seeds, topological_sort,
    DependencyFirstTraversal,
};
pub use snapshot::{load_snapshot, sanitize_repo_name, save_snapshot, snapshot_path};

// src/core/test_support.rs
//! Fixtures shared by the unit tests.

use super::graph::{ComponentType, DependencyGraph, GraphBuilder, RawComponentRecord, RawEdgeRecord};

/// Component record for `id`, placed in a file derived from its module path
pub fn record(id: &str, name: &str, file: &str) -> RawComponentRecord {
    RawComponentRecord {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        component_type: Some("class".to_string()),
        file_path: Some(format!("/repo/{}", file)),
        relative_path: Some(file.to_string()),
        source_code: Some(format!("class {}:\n    pass", name)),
        ..Default::default()
    }
}

fn file_for(id: &str) -> String {
    match id.rsplit_once('.') {
        Some((module, _)) => format!("{}.py", module.replace('.', "/")),
        None => "main.py".to_string(),
    }
}

fn name_for(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

/// Graph over `ids` with `(caller, callee)` edges given by id
pub fn graph_from_edges(ids: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
    let functions: Vec<RawComponentRecord> = ids
        .iter()
        .map(|id| record(id, name_for(id), &file_for(id)))
        .collect();
    let relationships: Vec<RawEdgeRecord> = edges
        .iter()
        .map(|(caller, callee)| RawEdgeRecord::new(caller, callee))
        .collect();

    GraphBuilder::new().build(&functions, &relationships)
}

/// Edge-free graph whose components have the given types
pub fn graph_with_types(components: &[(&str, ComponentType)]) -> DependencyGraph {
    let functions: Vec<RawComponentRecord> = components
        .iter()
        .map(|(id, component_type)| RawComponentRecord {
            component_type: Some(component_type.as_str().to_string()),
            ..record(id, name_for(id), &file_for(id))
        })
        .collect();

    GraphBuilder::new().build(&functions, &[])
}

/// Graph whose components carry `source` as their code, one file per id prefix
pub fn graph_with_sources(components: &[(&str, &str)]) -> DependencyGraph {
    let functions: Vec<RawComponentRecord> = components
        .iter()
        .map(|(id, source)| RawComponentRecord {
            source_code: Some(source.to_string()),
            ..record(id, name_for(id), &file_for(id))
        })
        .collect();

    GraphBuilder::new().build(&functions, &[])
}

// src/core/mod.rs
mod engine;

pub mod clustering;
pub mod graph;
pub mod llm;
pub mod module_tree;

#[cfg(test)]
pub(crate) mod test_support;

// Export the main engine
pub use engine::Engine;

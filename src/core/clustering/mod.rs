// src/core/clustering/mod.rs
//! Recursive module clustering
//!
//! Candidate components are grouped by file and measured against a token
//! budget; sets that are too large are handed to the grouping oracle and the
//! proposed modules are merged into the module tree and subdivided in turn.

mod engine;
mod listing;
mod prompt;
mod response;

pub use engine::{ClusterEngine, ClusterOutcome, ClusterSettings, ClusterStats};
pub use listing::{format_candidates, CharEstimateCounter, ComponentListing, TokenCounter, TokenizerCounter};
pub use prompt::ClusterPrompt;
pub use response::{extract_grouped_region, parse_grouping_response, parse_literal, ParsedGrouping, ProposedGroup};

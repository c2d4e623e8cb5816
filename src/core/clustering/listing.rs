// src/core/clustering/listing.rs
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::warn;

use crate::core::graph::Node;
use crate::error::{CodeweaveError, Result};

/// Measures text in model-token units
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Character-based estimate, ~4 characters per token
#[derive(Debug, Clone, Copy)]
pub struct CharEstimateCounter {
    chars_per_token: usize,
}

impl CharEstimateCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharEstimateCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for CharEstimateCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Counts with a model tokenizer loaded from a `tokenizer.json`
pub struct TokenizerCounter {
    tokenizer: Tokenizer,
    fallback: CharEstimateCounter,
}

impl TokenizerCounter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| CodeweaveError::Config(format!("Failed to load tokenizer {}: {}", path.display(), e)))?;
        Ok(Self {
            tokenizer,
            fallback: CharEstimateCounter::default(),
        })
    }
}

impl TokenCounter for TokenizerCounter {
    fn count(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                warn!("Tokenizer failed, estimating from characters: {}", e);
                self.fallback.count(text)
            }
        }
    }
}

/// Candidate components rendered for the budget check and the oracle prompt
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentListing {
    /// Candidates that exist in the component map, grouped by file
    pub valid_ids: Vec<String>,
    /// Ids only, one `# <file>` header per file
    pub summary: String,
    /// Ids followed by their source text
    pub with_code: String,
}

/// Group candidates by relative path (files and ids in ascending order) and
/// render both listings. Unknown ids are dropped with a warning.
pub fn format_candidates(candidates: &[String], components: &BTreeMap<String, Node>) -> ComponentListing {
    let mut by_file: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for id in candidates {
        match components.get(id) {
            Some(node) => {
                by_file.entry(node.relative_path.as_str()).or_default().insert(id.as_str());
            }
            None => warn!("Skipping invalid leaf node '{}' - not found in components", id),
        }
    }

    let mut listing = ComponentListing::default();
    for (file, ids) in by_file {
        listing.summary.push_str(&format!("# {}\n", file));
        listing.with_code.push_str(&format!("# {}\n", file));

        for id in ids {
            listing.summary.push_str(&format!("\t{}\n", id));
            listing.with_code.push_str(&format!("\t{}\n", id));
            listing.with_code.push_str(&components[id].source_code);
            listing.with_code.push('\n');
            listing.valid_ids.push(id.to_string());
        }
    }

    listing
}

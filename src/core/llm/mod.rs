//! LLM integration for the grouping oracle
//!
//! Clustering only needs "prompt in, text out"; this module provides that
//! behind the `CompletionProvider` trait together with the retry and
//! fallback-model policy of the calling layer.

mod completion;
mod providers;

pub use completion::CompletionProvider;
pub use providers::{create_provider, FallbackProvider, OpenAiCompatibleProvider};

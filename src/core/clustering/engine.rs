// src/core/clustering/engine.rs
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::ClusteringConfig;
use crate::core::graph::Node;
use crate::core::llm::CompletionProvider;
use crate::core::module_tree::{ModuleTree, ModuleTreeStore, NewModule};
use crate::error::{CodeweaveError, Result};
use super::listing::{format_candidates, TokenCounter};
use super::prompt::ClusterPrompt;
use super::response::{parse_grouping_response, ParsedGrouping, ProposedGroup};

type SharedTree = Arc<RwLock<ModuleTree>>;
type BranchFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub max_tokens_per_module: usize,
    pub max_concurrent_requests: usize,
    pub response_excerpt_chars: usize,
}

impl From<&ClusteringConfig> for ClusterSettings {
    fn from(config: &ClusteringConfig) -> Self {
        Self {
            max_tokens_per_module: config.max_tokens_per_module,
            max_concurrent_requests: config.max_concurrent_requests,
            response_excerpt_chars: config.response_excerpt_chars,
        }
    }
}

/// Counters for one clustering run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterStats {
    pub oracle_calls: usize,
    pub oracle_failures: usize,
    pub rejected_responses: usize,
    pub degenerate_responses: usize,
    pub base_cases: usize,
    pub modules_created: usize,
    pub invalid_ids_filtered: usize,
}

#[derive(Default)]
struct Counters {
    oracle_calls: AtomicUsize,
    oracle_failures: AtomicUsize,
    rejected_responses: AtomicUsize,
    degenerate_responses: AtomicUsize,
    base_cases: AtomicUsize,
    modules_created: AtomicUsize,
    invalid_ids_filtered: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ClusterStats {
        ClusterStats {
            oracle_calls: self.oracle_calls.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            rejected_responses: self.rejected_responses.load(Ordering::Relaxed),
            degenerate_responses: self.degenerate_responses.load(Ordering::Relaxed),
            base_cases: self.base_cases.load(Ordering::Relaxed),
            modules_created: self.modules_created.load(Ordering::Relaxed),
            invalid_ids_filtered: self.invalid_ids_filtered.load(Ordering::Relaxed),
        }
    }
}

/// Result of a clustering run
#[derive(Debug)]
pub struct ClusterOutcome {
    pub tree: ModuleTree,
    pub stats: ClusterStats,
}

/// A freshly created module waiting for its own subdivision pass
#[derive(Debug)]
struct PendingBranch {
    path: Vec<String>,
    candidates: Vec<String>,
}

struct Shared {
    components: Arc<BTreeMap<String, Node>>,
    oracle: Arc<dyn CompletionProvider>,
    counter: Arc<dyn TokenCounter>,
    prompt: ClusterPrompt,
    settings: ClusterSettings,
    permits: Semaphore,
    counters: Counters,
}

/// Recursive, budget-driven module clustering.
///
/// Each branch works on its own candidate set and its own subtree location;
/// sibling branches run as separate tasks and only meet at the tree lock
/// while merging a validated grouping.
pub struct ClusterEngine {
    shared: Arc<Shared>,
}

impl ClusterEngine {
    pub fn new(
        components: Arc<BTreeMap<String, Node>>,
        oracle: Arc<dyn CompletionProvider>,
        counter: Arc<dyn TokenCounter>,
        settings: ClusterSettings,
    ) -> Result<Self> {
        let permits = Semaphore::new(settings.max_concurrent_requests.max(1));
        Ok(Self {
            shared: Arc::new(Shared {
                components,
                oracle,
                counter,
                prompt: ClusterPrompt::new()?,
                settings,
                permits,
                counters: Counters::default(),
            }),
        })
    }

    /// Cluster `seeds` into a module tree.
    ///
    /// With a non-empty `resume` tree its modules are kept and every leaf
    /// module is examined again. When a store is given the
    /// tree is checkpointed after the top-level merge and after every
    /// top-level subtree completes.
    pub async fn run(
        &self,
        seeds: Vec<String>,
        resume: Option<ModuleTree>,
        store: Option<&ModuleTreeStore>,
    ) -> Result<ClusterOutcome> {
        let tree: SharedTree = Arc::new(RwLock::new(ModuleTree::new()));

        let top_level = match resume.filter(|t| !t.is_empty()) {
            Some(existing) => {
                let pending = self.resumable_branches(&existing);
                info!(
                    "♻️  Resuming module tree with {} top-level modules, {} leaf modules to re-examine",
                    existing.roots().len(),
                    pending.len()
                );
                *tree.write().await = existing;
                pending
            }
            None => {
                info!("🧩 Clustering {} seed components", seeds.len());
                let pending = self.shared.cluster_branch(&tree, seeds, Vec::new()).await?;
                if let Some(store) = store {
                    store.checkpoint(&*tree.read().await)?;
                }
                pending
            }
        };

        let mut tasks = JoinSet::new();
        for branch in top_level {
            tasks.spawn(cluster_subtree(self.shared.clone(), tree.clone(), branch));
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| CodeweaveError::Task(e.to_string()))??;
            if let Some(store) = store {
                store.checkpoint(&*tree.read().await)?;
            }
        }

        let tree = std::mem::take(&mut *tree.write().await);
        let stats = self.shared.counters.snapshot();
        info!(
            "✅ Clustering finished: {} modules, {} oracle calls ({} failed, {} rejected, {} degenerate)",
            tree.module_count(),
            stats.oracle_calls,
            stats.oracle_failures,
            stats.rejected_responses,
            stats.degenerate_responses
        );

        Ok(ClusterOutcome { tree, stats })
    }

    /// Every leaf module of a persisted tree, at any depth. An interrupted
    /// run can leave leaves under a partly subdivided parent; the budget
    /// check decides which of them still need splitting.
    fn resumable_branches(&self, tree: &ModuleTree) -> Vec<PendingBranch> {
        tree.leaf_modules()
            .into_iter()
            .filter_map(|id| tree.get(id))
            .map(|entry| PendingBranch {
                path: entry.full_path(),
                candidates: entry.components.iter().cloned().collect(),
            })
            .collect()
    }
}

fn cluster_subtree(shared: Arc<Shared>, tree: SharedTree, branch: PendingBranch) -> BranchFuture {
    Box::pin(async move {
        let children = shared.cluster_branch(&tree, branch.candidates, branch.path).await?;
        if children.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for child in children {
            tasks.spawn(cluster_subtree(shared.clone(), tree.clone(), child));
        }
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| CodeweaveError::Task(e.to_string()))??;
        }
        Ok(())
    })
}

impl Shared {
    /// Examine one candidate set under `parent_path`. Returns the modules
    /// that were merged into the tree and still need their own pass; an
    /// empty result means the candidates stay flat in their parent.
    async fn cluster_branch(
        &self,
        tree: &SharedTree,
        candidates: Vec<String>,
        parent_path: Vec<String>,
    ) -> Result<Vec<PendingBranch>> {
        let unknown = candidates.iter().filter(|id| !self.components.contains_key(*id)).count();
        Counters::bump(&self.counters.invalid_ids_filtered, unknown);
        let listing = format_candidates(&candidates, &self.components);

        let tokens = self.counter.count(&listing.with_code);
        if tokens <= self.settings.max_tokens_per_module {
            debug!(
                "{} components ({} tokens) fit the budget under {:?}",
                listing.valid_ids.len(),
                tokens,
                parent_path
            );
            Counters::bump(&self.counters.base_cases, 1);
            return Ok(Vec::new());
        }

        let module_name = parent_path.last().map(String::as_str);
        let prompt = {
            let tree = tree.read().await;
            let tree_json = if tree.is_empty() {
                None
            } else {
                Some(tree.to_json_string()?)
            };
            self.prompt.render(&listing.summary, tree_json.as_deref(), module_name)?
        };

        debug!(
            "Requesting grouping for {} components ({} tokens) under {:?}",
            listing.valid_ids.len(),
            tokens,
            parent_path
        );

        let response = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| CodeweaveError::Task(e.to_string()))?;
            Counters::bump(&self.counters.oracle_calls, 1);
            self.oracle.complete(&prompt).await
        };

        let response = match response {
            Ok(text) => text,
            Err(e) => {
                warn!("Grouping request failed for {:?}, keeping components flat: {}", parent_path, e);
                Counters::bump(&self.counters.oracle_failures, 1);
                return Ok(Vec::new());
            }
        };

        let groups = match parse_grouping_response(&response) {
            ParsedGrouping::Parsed(groups) => groups,
            ParsedGrouping::MissingMarkers => {
                warn!(
                    "Grouping response for {:?} has no grouped components block: {}",
                    parent_path,
                    self.excerpt(&response)
                );
                Counters::bump(&self.counters.rejected_responses, 1);
                return Ok(Vec::new());
            }
            ParsedGrouping::Malformed(reason) => {
                warn!(
                    "Grouping response for {:?} could not be parsed ({}): {}",
                    parent_path,
                    reason,
                    self.excerpt(&response)
                );
                Counters::bump(&self.counters.rejected_responses, 1);
                return Ok(Vec::new());
            }
        };

        let modules = self.validate_groups(groups);
        if modules.len() <= 1 {
            warn!(
                "Grouping for {:?} produced {} usable modules, keeping components flat",
                parent_path,
                modules.len()
            );
            Counters::bump(&self.counters.degenerate_responses, 1);
            return Ok(Vec::new());
        }

        let pending: Vec<PendingBranch> = modules
            .iter()
            .filter(|module| {
                // Same-sized sets would ask the oracle the same question again
                let smaller = module.components.len() < listing.valid_ids.len();
                if !smaller {
                    warn!(
                        "Module '{}' under {:?} covers every candidate, not subdividing it further",
                        module.name, parent_path
                    );
                }
                smaller
            })
            .map(|module| {
                let mut path = parent_path.clone();
                path.push(module.name.clone());
                PendingBranch {
                    path,
                    candidates: module.components.iter().cloned().collect(),
                }
            })
            .collect();

        let created = modules.len();
        {
            let mut tree = tree.write().await;
            if tree.insert_modules(&parent_path, modules).is_none() {
                warn!("Parent module {:?} disappeared from the tree, dropping its grouping", parent_path);
                return Ok(Vec::new());
            }
        }
        Counters::bump(&self.counters.modules_created, created);

        info!("📦 Split {:?} into {} modules", parent_path, created);
        Ok(pending)
    }

    /// Keep only known component ids; groups left empty are dropped
    fn validate_groups(&self, groups: Vec<ProposedGroup>) -> Vec<NewModule> {
        let mut modules = Vec::with_capacity(groups.len());

        for group in groups {
            let name = group.name.trim().to_string();
            if name.is_empty() {
                warn!("Dropping proposed module with an empty name");
                continue;
            }

            let mut components = BTreeSet::new();
            for id in group.components {
                if self.components.contains_key(&id) {
                    components.insert(id);
                } else {
                    debug!("Dropping unknown component '{}' from module '{}'", id, name);
                    Counters::bump(&self.counters.invalid_ids_filtered, 1);
                }
            }

            if components.is_empty() {
                warn!("Dropping proposed module '{}' with no known components", name);
                continue;
            }

            modules.push(NewModule {
                name,
                description: group.description,
                components,
            });
        }

        modules
    }

    fn excerpt<'a>(&self, response: &'a str) -> &'a str {
        match response.char_indices().nth(self.settings.response_excerpt_chars) {
            Some((end, _)) => &response[..end],
            None => response,
        }
    }
}

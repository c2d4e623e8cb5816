// src/core/engine.rs
use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use super::clustering::{CharEstimateCounter, ClusterEngine, ClusterSettings, TokenCounter, TokenizerCounter};
use super::graph::{
    dependency_order, find_leaf_nodes, resolve_cycles, save_snapshot, select_cluster_seeds, snapshot_path,
    AnalysisOutput, DependencyFirstTraversal, DependencyGraph, GraphBuilder,
};
use super::llm::create_provider;
use super::module_tree::{DocumentationMetadata, GenerationInfo, ModuleTreeStore, TreeStatistics};

/// Main orchestration engine for Codeweave
pub struct Engine {
    config: Config,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self { config })
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        info!("Initializing Codeweave in: {}", target_dir.display());

        std::fs::create_dir_all(&target_dir)
            .with_context(|| format!("Failed to create {}", target_dir.display()))?;

        let config_path = target_dir.join("Codeweave.toml");
        if config_path.exists() {
            warn!("⚠️ {} already exists, leaving it untouched", config_path.display());
            return Ok(());
        }

        Config::default().save(&config_path)?;
        info!("✅ Wrote {}", config_path.display());
        Ok(())
    }

    /// Build the dependency graph and write its snapshot
    pub async fn graph(&self, analysis: &Path, repo_name: Option<String>) -> Result<()> {
        let repo_name = repo_name.unwrap_or_else(|| default_repo_name(analysis));
        let graph = self.build_graph(analysis)?;

        let path = snapshot_path(&self.config.project.dependency_graph_path(), &repo_name);
        save_snapshot(&graph, &path)?;
        info!("💾 Dependency graph written to {}", path.display());

        let condensed = resolve_cycles(&graph);
        let leaves = find_leaf_nodes(&graph);
        let report = graph.report();

        println!("Repository:      {}", repo_name);
        println!("Components:      {}", graph.len());
        println!("Modules:         {}", graph.modules().len());
        println!("Edges:           {}", graph.edge_count());
        println!("Leaf nodes:      {}", leaves.len());
        println!("Cycles:          {}", condensed.cycles().count());
        println!("Skipped records: {}", report.skipped_components());
        println!("Skipped edges:   {}", report.skipped_edges());
        println!("Ambiguous edges: {}", report.ambiguous_edges.len());
        Ok(())
    }

    /// Print the dependency-first processing order
    pub async fn order(&self, analysis: &Path, limit: Option<usize>, depth_first: bool) -> Result<()> {
        let graph = self.build_graph(analysis)?;
        let condensed = resolve_cycles(&graph);

        let order: Box<dyn Iterator<Item = String> + '_> = if depth_first {
            Box::new(DependencyFirstTraversal::new(&condensed))
        } else {
            Box::new(dependency_order(&graph).into_iter())
        };

        let shown = limit.unwrap_or(graph.len()).min(graph.len());
        for (position, id) in order.take(shown).enumerate() {
            println!("{:>6}  {}", position + 1, id);
        }
        if shown < graph.len() {
            println!("... {} more", graph.len() - shown);
        }

        let cycles: Vec<&[String]> = condensed.cycles().collect();
        if !cycles.is_empty() {
            println!();
            println!("Cycles ({}):", cycles.len());
            for members in cycles {
                println!("  {}", members.join(" <-> "));
            }
        }
        Ok(())
    }

    /// Full pipeline: graph, seeds, clustering, persisted module tree
    pub async fn cluster(&self, analysis: &Path, repo_name: Option<String>, fresh: bool) -> Result<()> {
        let repo_name = repo_name.unwrap_or_else(|| default_repo_name(analysis));
        let graph = self.build_graph(analysis)?;

        let path = snapshot_path(&self.config.project.dependency_graph_path(), &repo_name);
        save_snapshot(&graph, &path)?;
        info!("💾 Dependency graph written to {}", path.display());

        let leaves = find_leaf_nodes(&graph);
        let seeds = select_cluster_seeds(&graph, &leaves, &self.config.clustering.seed_component_types);
        info!("🌱 {} leaf nodes, {} cluster seeds", leaves.len(), seeds.len());

        let store = ModuleTreeStore::new(self.config.project.docs_path());
        let resume = if fresh {
            None
        } else {
            store.load_first()?
        };

        let llm = &self.config.llm;
        let oracle = create_provider(llm, llm.cluster_model())?;
        info!("🤖 Grouping oracle: {} ({})", oracle.model_name(), oracle.provider_name());

        let counter: Arc<dyn TokenCounter> = match &self.config.clustering.tokenizer_path {
            Some(path) => {
                info!("🔢 Measuring listings with tokenizer {}", path.display());
                Arc::new(TokenizerCounter::from_file(path)?)
            }
            None => Arc::new(CharEstimateCounter::default()),
        };

        let total_components = graph.len();
        let cluster_seeds = seeds.len();
        let components = Arc::new(graph.into_components());
        let engine = ClusterEngine::new(
            components,
            oracle,
            counter,
            ClusterSettings::from(&self.config.clustering),
        )?;

        let outcome = engine.run(seeds, resume, Some(&store)).await?;
        if outcome.tree.is_empty() {
            info!("📄 Repository fits a single module, writing an empty module tree");
        }
        store.save_final(&outcome.tree)?;
        debug!("Documentation order: {:?}", outcome.tree.processing_order());

        let metadata = DocumentationMetadata::new(
            GenerationInfo {
                timestamp: chrono::Utc::now().to_rfc3339(),
                main_model: llm.main_model.clone(),
                cluster_model: llm.cluster_model().to_string(),
                generator_version: env!("CARGO_PKG_VERSION").to_string(),
                repo_name: repo_name.clone(),
            },
            TreeStatistics {
                total_components,
                leaf_nodes: leaves.len(),
                cluster_seeds,
                modules: outcome.tree.module_count(),
                leaf_modules: outcome.tree.leaf_modules().len(),
                max_tokens_per_module: self.config.clustering.max_tokens_per_module,
                max_tokens_per_leaf_module: self.config.clustering.max_tokens_per_leaf_module,
            },
        );
        store.save_metadata(&metadata)?;

        info!("🎉 Module tree for {} written to {}", repo_name, store.docs_dir().display());
        println!("Modules:      {}", outcome.tree.module_count());
        println!("Leaf modules: {}", outcome.tree.leaf_modules().len());
        println!("Oracle calls: {}", outcome.stats.oracle_calls);
        Ok(())
    }

    fn build_graph(&self, analysis: &Path) -> Result<DependencyGraph> {
        info!("🔍 Reading analysis output from {}", analysis.display());
        let decoded = AnalysisOutput::load(analysis)?.decode();

        let graph = GraphBuilder::new().build_from_analysis(&decoded);
        let report = graph.report();
        info!(
            "📊 Dependency graph: {} components, {} edges ({} records and {} edges skipped)",
            graph.len(),
            graph.edge_count(),
            report.skipped_components(),
            report.skipped_edges()
        );
        if !report.ambiguous_edges.is_empty() {
            warn!(
                "⚠️ {} edges were resolved by bare name with several candidates",
                report.ambiguous_edges.len()
            );
        }
        Ok(graph)
    }
}

/// Repository name derived from the analysis file name
fn default_repo_name(analysis: &Path) -> String {
    analysis
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.trim_end_matches("_analysis").to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "repository".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_analysis(dir: &Path) -> PathBuf {
        let path = dir.join("demo_analysis.json");
        let document = serde_json::json!({
            "functions": [
                {"id": "app.Service", "name": "Service", "component_type": "class",
                 "relative_path": "app.py", "source_code": "class Service: ..."},
                {"id": "app.Helper", "name": "Helper", "component_type": "class",
                 "relative_path": "app.py", "source_code": "class Helper: ..."},
                {"id": 42}
            ],
            "relationships": [
                {"caller": "app.Service", "callee": "app.Helper"},
                {"caller": "app.Service", "callee": "missing.Thing"}
            ]
        });
        std::fs::write(&path, document.to_string()).unwrap();
        path
    }

    fn engine_for(dir: &Path) -> Engine {
        let mut config = Config::default();
        config.project.output_dir = dir.join("output");
        Engine { config }
    }

    #[test]
    fn test_default_repo_name() {
        assert_eq!(default_repo_name(Path::new("/tmp/demo_analysis.json")), "demo");
        assert_eq!(default_repo_name(Path::new("calls.json")), "calls");
    }

    #[tokio::test]
    async fn test_graph_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = write_analysis(dir.path());
        let engine = engine_for(dir.path());

        engine.graph(&analysis, None).await.unwrap();

        let snapshot = dir.path().join("output/dependency_graphs/demo_dependency_graph.json");
        let graph = crate::core::graph::load_snapshot(&snapshot).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.dependencies("app.Service").collect::<Vec<_>>(),
            vec!["app.Helper"]
        );
    }

    #[tokio::test]
    async fn test_cluster_small_repository_writes_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = write_analysis(dir.path());
        let engine = engine_for(dir.path());

        // Everything fits the default budget, so the oracle is never contacted
        engine.cluster(&analysis, Some("demo".to_string()), true).await.unwrap();

        let store = ModuleTreeStore::new(dir.path().join("output/docs"));
        assert!(store.load_first().unwrap().unwrap().is_empty());
        assert!(store.load_working().unwrap().unwrap().is_empty());

        let metadata: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.metadata_path()).unwrap()).unwrap();
        assert_eq!(metadata["generation_info"]["repo_name"], "demo");
        assert_eq!(metadata["statistics"]["total_components"], 2);
        assert_eq!(metadata["statistics"]["leaf_nodes"], 1);
    }

    #[tokio::test]
    async fn test_init_writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_for(dir.path());

        engine.init(Some(dir.path().to_path_buf())).await.unwrap();

        let config = Config::load(dir.path().join("Codeweave.toml")).unwrap();
        assert_eq!(config.clustering.max_tokens_per_module, 36_369);
    }
}

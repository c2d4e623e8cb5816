use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "codeweave")]
#[command(about = "Dependency graphs and module trees for repository documentation")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default Codeweave.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Build the dependency graph and write its snapshot
    Graph {
        /// Analyzer output with functions and relationships
        #[arg(short, long)]
        analysis: PathBuf,

        /// Repository name used for the snapshot file
        #[arg(long)]
        repo_name: Option<String>,
    },

    /// Print the dependency-first processing order
    Order {
        /// Analyzer output with functions and relationships
        #[arg(short, long)]
        analysis: PathBuf,

        /// Only print the first N components
        #[arg(short, long)]
        limit: Option<usize>,

        /// Walk the graph depth-first instead of printing the sorted order
        #[arg(long)]
        depth_first: bool,
    },

    /// Cluster leaf components into a module tree
    Cluster {
        /// Analyzer output with functions and relationships
        #[arg(short, long)]
        analysis: PathBuf,

        /// Repository name recorded in the snapshot and metadata
        #[arg(long)]
        repo_name: Option<String>,

        /// Ignore any module tree left by an earlier run
        #[arg(long)]
        fresh: bool,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                engine.init(path).await
            }
            Commands::Graph { analysis, repo_name } => {
                engine.graph(&analysis, repo_name).await
            }
            Commands::Order { analysis, limit, depth_first } => {
                engine.order(&analysis, limit, depth_first).await
            }
            Commands::Cluster { analysis, repo_name, fresh } => {
                engine.cluster(&analysis, repo_name, fresh).await
            }
        }
    }
}

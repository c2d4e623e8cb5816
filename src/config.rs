use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CodeweaveError, Result};

/// Environment variable consulted when `llm.api_key` is not set in the file
pub const API_KEY_ENV: &str = "CODEWEAVE_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint
    pub base_url: String,

    /// API key (falls back to CODEWEAVE_API_KEY)
    pub api_key: Option<String>,

    /// Primary model name
    pub main_model: String,

    /// Model used for module clustering (defaults to the main model)
    pub cluster_model: Option<String>,

    /// Model tried after the primary model exhausts its retries
    pub fallback_model: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens for a completion
    pub max_tokens: u32,

    /// Retries per model before giving up on it
    pub max_retries: u32,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output locations
    pub project: ProjectConfig,

    /// Module clustering settings
    pub clustering: ClusteringConfig,

    /// Grouping oracle settings
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root directory for everything codeweave writes
    pub output_dir: PathBuf,

    /// Dependency graph snapshots, relative to `output_dir`
    pub dependency_graph_dir: PathBuf,

    /// Module trees and metadata, relative to `output_dir`
    pub docs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Token budget above which a candidate set is subdivided
    pub max_tokens_per_module: usize,

    /// Budget handed to the documentation driver for leaf modules
    pub max_tokens_per_leaf_module: usize,

    /// Component types that qualify a leaf node as a clustering seed
    pub seed_component_types: Vec<String>,

    /// Upper bound on concurrent oracle requests
    pub max_concurrent_requests: usize,

    /// How much of a rejected oracle response ends up in the logs
    pub response_excerpt_chars: usize,

    /// `tokenizer.json` used to measure listings; without it tokens are
    /// estimated from character counts
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://0.0.0.0:4000/".to_string(),
            api_key: None,
            main_model: "claude-sonnet-4".to_string(),
            cluster_model: None,
            fallback_model: Some("glm-4p5".to_string()),
            temperature: 0.0,
            max_tokens: 32_768,
            max_retries: 2,
            request_timeout_secs: 300,
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            dependency_graph_dir: PathBuf::from("dependency_graphs"),
            docs_dir: PathBuf::from("docs"),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_module: 36_369,
            max_tokens_per_leaf_module: 16_000,
            seed_component_types: vec![
                "class".to_string(),
                "interface".to_string(),
                "struct".to_string(),
            ],
            max_concurrent_requests: 4,
            response_excerpt_chars: 200,
            tokenizer_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            clustering: ClusteringConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Model used for grouping requests
    pub fn cluster_model(&self) -> &str {
        self.cluster_model.as_deref().unwrap_or(&self.main_model)
    }

    /// API key from the config file or the environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl ProjectConfig {
    pub fn dependency_graph_path(&self) -> PathBuf {
        self.output_dir.join(&self.dependency_graph_dir)
    }

    pub fn docs_path(&self) -> PathBuf {
        self.output_dir.join(&self.docs_dir)
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CodeweaveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CodeweaveError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Codeweave.toml",
                    "codeweave.toml",
                    ".codeweave.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.clustering.max_tokens_per_module == 0 {
            return Err(CodeweaveError::Config(
                "clustering.max_tokens_per_module must be greater than zero".to_string(),
            ));
        }
        if self.clustering.max_concurrent_requests == 0 {
            return Err(CodeweaveError::Config(
                "clustering.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

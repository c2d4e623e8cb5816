use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Codeweave operations
#[derive(Error, Debug)]
pub enum CodeweaveError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("File system error at {path}: {message}")]
    FileSystem { path: PathBuf, message: String },

    #[error("Invalid analysis output: {0}")]
    Analysis(String),

    /// Transport-level failure talking to the completion service
    #[error("Oracle request failed: {0}")]
    Oracle(String),

    #[error("Clustering task failed: {0}")]
    Task(String),
}

impl CodeweaveError {
    pub fn file_system(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::FileSystem {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodeweaveError>;

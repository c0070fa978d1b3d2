//! Error types for collection-level failures.
//!
//! Anything reported through [`SummaryError`] aborts the read of a whole
//! collection. Failures confined to a single survey variant are carried as
//! `anyhow::Error` values inside [`crate::pipeline::VariantOutcome`] instead.

use std::path::PathBuf;

use crate::db::repository::RepositoryError;

/// Result type for collection-level operations
pub type SummaryResult<T> = Result<T, SummaryError>;

/// Fatal error raised while reading a collection
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("Failed to parse {field} line \"{line}\"")]
    Parse { field: &'static str, line: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Missing input file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Table error in {}: {message}", path.display())]
    Table { path: PathBuf, message: String },

    #[error("Scratch directory error: {0}")]
    ScratchDir(String),

    #[error("Cosmology join error: {0}")]
    Cosmology(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("YAML error in {context}: {message}")]
    Yaml { context: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SummaryError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SummaryError::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a table error for `path`.
    pub fn table(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SummaryError::Table {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn yaml(context: impl Into<String>, message: impl ToString) -> Self {
        SummaryError::Yaml {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

//! Artifact store contract.
//!
//! A summarized collection is persisted as one JSON artifact per top-level
//! field (`surveyinfo`, `instrinfo`, `analysisinfo`, `tiers`, `surveys`,
//! `spectiercids`), each stored under an [`ArtifactKey`]. Backends only need
//! to store and load opaque JSON values by key.
//!
//! # Thread Safety
//! Implementations must be `Send + Sync` to work with async Rust.

pub mod error;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub use error::{RepositoryError, RepositoryResult};

/// Key of one persisted artifact: a collection name and a field name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    pub collection: String,
    pub field: String,
}

impl ArtifactKey {
    pub fn new(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
        }
    }

    /// File stem used by file-backed stores: `<collection>_<field>`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.collection, self.field)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Check if the store is usable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Store `value` under `key`, replacing any previous value.
    async fn store_artifact(&self, key: &ArtifactKey, value: &Value) -> RepositoryResult<()>;

    /// Load the value stored under `key`.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If nothing is stored under `key`
    async fn load_artifact(&self, key: &ArtifactKey) -> RepositoryResult<Value>;

    /// Remove the value stored under `key`.
    ///
    /// # Returns
    /// * `Ok(true)` - If a value was removed
    /// * `Ok(false)` - If nothing was stored under `key`
    async fn delete_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool>;

    /// Whether a value is stored under `key`.
    async fn has_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool>;

    /// Names of collections that have at least one artifact, sorted.
    async fn list_collections(&self) -> RepositoryResult<Vec<String>>;
}

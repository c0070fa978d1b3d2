//! In-memory local repository implementation.
//!
//! Artifacts are kept in a `HashMap` behind an `Arc<RwLock<..>>`, which makes
//! this store fast, deterministic and isolated for unit tests and for runs
//! that do not want a cache on disk.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::db::repository::error::poisoned;
use crate::db::repository::{ArtifactKey, ArtifactRepository, RepositoryError, RepositoryResult};

/// In-memory artifact store.
///
/// # Example
/// ```
/// use snana_summary::db::repositories::LocalRepository;
/// use snana_summary::db::repository::{ArtifactKey, ArtifactRepository};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let repo = LocalRepository::new();
///     let key = ArtifactKey::new("1TIER", "tiers");
///     repo.store_artifact(&key, &serde_json::json!([])).await.unwrap();
///     assert_eq!(repo.list_collections().await.unwrap(), vec!["1TIER".to_string()]);
/// });
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    artifacts: HashMap<ArtifactKey, Value>,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            artifacts: HashMap::new(),
            is_healthy: true,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing store failures.
    pub fn set_healthy(&self, healthy: bool) -> RepositoryResult<()> {
        self.data.write().map_err(poisoned)?.is_healthy = healthy;
        Ok(())
    }

    /// Clear all artifacts.
    pub fn clear(&self) -> RepositoryResult<()> {
        self.data.write().map_err(poisoned)?.artifacts.clear();
        Ok(())
    }

    /// Number of stored artifacts.
    pub fn artifact_count(&self) -> RepositoryResult<usize> {
        Ok(self.data.read().map_err(poisoned)?.artifacts.len())
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().map_err(poisoned)?.is_healthy {
            return Err(RepositoryError::IoError(
                "Local store is not healthy".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().map_err(poisoned)?.is_healthy)
    }

    async fn store_artifact(&self, key: &ArtifactKey, value: &Value) -> RepositoryResult<()> {
        self.check_health()?;
        self.data
            .write()
            .map_err(poisoned)?
            .artifacts
            .insert(key.clone(), value.clone());
        Ok(())
    }

    async fn load_artifact(&self, key: &ArtifactKey) -> RepositoryResult<Value> {
        self.check_health()?;
        self.data
            .read()
            .map_err(poisoned)?
            .artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Artifact {} not found", key)))
    }

    async fn delete_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool> {
        self.check_health()?;
        Ok(self
            .data
            .write()
            .map_err(poisoned)?
            .artifacts
            .remove(key)
            .is_some())
    }

    async fn has_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool> {
        Ok(self.data.read().map_err(poisoned)?.artifacts.contains_key(key))
    }

    async fn list_collections(&self) -> RepositoryResult<Vec<String>> {
        let data = self.data.read().map_err(poisoned)?;
        let names: BTreeSet<String> = data.artifacts.keys().map(|k| k.collection.clone()).collect();
        Ok(names.into_iter().collect())
    }
}

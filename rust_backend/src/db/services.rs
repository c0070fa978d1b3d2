//! High-level store operations.
//!
//! Repository-agnostic functions that persist and rebuild whole collections
//! through any [`ArtifactRepository`]. A collection is stored as one artifact
//! per entry of [`Collection::ARTIFACT_FIELDS`].
//!
//! # Usage
//!
//! ```
//! use snana_summary::db::{services, repositories::LocalRepository};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let repo = LocalRepository::new();
//!     let names = services::list_collections(&repo).await.unwrap();
//!     assert!(names.is_empty());
//! });
//! ```

use log::{debug, info, warn};
use std::collections::BTreeMap;

use super::repository::{ArtifactKey, ArtifactRepository, RepositoryError, RepositoryResult};
use crate::core::domain::Collection;
use crate::error::SummaryResult;

/// Check if the store is usable.
pub async fn health_check<R: ArtifactRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

/// Persist every artifact of `collection`, replacing earlier copies.
///
/// All fields are serialized before the first write. If a write fails, every
/// artifact of the collection is removed again, so the store never holds a
/// mix of old and new fields; a later read sees a cache miss.
///
/// # Arguments
/// * `repo` - Store implementation
/// * `collection` - Assembled collection
pub async fn store_collection<R: ArtifactRepository + ?Sized>(
    repo: &R,
    collection: &Collection,
) -> SummaryResult<()> {
    let artifacts = collection.to_artifacts()?;
    for (field, value) in &artifacts {
        let key = ArtifactKey::new(&collection.name, *field);
        if let Err(e) = repo.store_artifact(&key, value).await {
            warn!("Failed to store {}, discarding collection {}", key, collection.name);
            if let Err(cleanup) = delete_collection(repo, &collection.name).await {
                warn!("Cleanup of {} failed: {}", collection.name, cleanup);
            }
            return Err(e.into());
        }
    }
    info!(
        "Stored collection {} ({} survey variants)",
        collection.name,
        collection.surveys.len()
    );
    Ok(())
}

/// Rebuild a collection from the store.
///
/// # Returns
/// * `Ok(Some(collection))` if every artifact is present
/// * `Ok(None)` if at least one artifact is missing
/// * `Err` if the store fails or an artifact does not deserialize
pub async fn load_collection<R: ArtifactRepository + ?Sized>(
    repo: &R,
    name: &str,
) -> SummaryResult<Option<Collection>> {
    let mut artifacts = BTreeMap::new();
    for field in Collection::ARTIFACT_FIELDS {
        let key = ArtifactKey::new(name, field);
        match repo.load_artifact(&key).await {
            Ok(value) => {
                artifacts.insert(field.to_string(), value);
            }
            Err(RepositoryError::NotFound(_)) => {
                debug!("Cache for {} incomplete: {} missing", name, key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(Collection::from_artifacts(name, artifacts)?))
}

/// Remove every artifact of collection `name`.
///
/// # Returns
/// The number of artifacts removed.
pub async fn delete_collection<R: ArtifactRepository + ?Sized>(
    repo: &R,
    name: &str,
) -> RepositoryResult<usize> {
    let mut removed = 0;
    for field in Collection::ARTIFACT_FIELDS {
        if repo.delete_artifact(&ArtifactKey::new(name, field)).await? {
            removed += 1;
        }
    }
    debug!("Removed {} artifacts of {}", removed, name);
    Ok(removed)
}

/// Names of the collections in the store.
pub async fn list_collections<R: ArtifactRepository + ?Sized>(
    repo: &R,
) -> RepositoryResult<Vec<String>> {
    repo.list_collections().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{AnalysisInfo, SurveyInfo, Tier};
    use crate::db::repositories::LocalRepository;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Local store that refuses writes of one field.
    struct RejectingField {
        inner: LocalRepository,
        field: &'static str,
    }

    #[async_trait]
    impl ArtifactRepository for RejectingField {
        async fn health_check(&self) -> RepositoryResult<bool> {
            self.inner.health_check().await
        }

        async fn store_artifact(&self, key: &ArtifactKey, value: &Value) -> RepositoryResult<()> {
            if key.field == self.field {
                return Err(RepositoryError::IoError(format!("disk full writing {}", key)));
            }
            self.inner.store_artifact(key, value).await
        }

        async fn load_artifact(&self, key: &ArtifactKey) -> RepositoryResult<Value> {
            self.inner.load_artifact(key).await
        }

        async fn delete_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool> {
            self.inner.delete_artifact(key).await
        }

        async fn has_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool> {
            self.inner.has_artifact(key).await
        }

        async fn list_collections(&self) -> RepositoryResult<Vec<String>> {
            self.inner.list_collections().await
        }
    }

    fn collection() -> Collection {
        Collection {
            name: "1TIER".to_string(),
            surveyinfo: SurveyInfo::default(),
            instrinfo: json!({"PLATESCALE": 0.11}),
            analysisinfo: AnalysisInfo::default(),
            tiers: vec![Tier {
                name: "WIDE".to_string(),
                ra: 0.0,
                dec: 0.0,
                bands: vec!['R', 'Z'],
                relarea: vec![1],
                dt_visit: vec![5.0],
                z_snrmatch: vec![0.5],
                texpose_prism: vec![900],
            }],
            surveys: BTreeMap::new(),
            spectiercids: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let repo = LocalRepository::new();
        let c = collection();
        store_collection(&repo, &c).await.unwrap();

        assert_eq!(repo.artifact_count().unwrap(), Collection::ARTIFACT_FIELDS.len());
        assert_eq!(list_collections(&repo).await.unwrap(), vec!["1TIER"]);
        assert_eq!(load_collection(&repo, "1TIER").await.unwrap(), Some(c));
    }

    #[tokio::test]
    async fn test_partial_cache_is_a_miss() {
        let repo = LocalRepository::new();
        repo.store_artifact(&ArtifactKey::new("1TIER", "tiers"), &json!([]))
            .await
            .unwrap();
        assert_eq!(load_collection(&repo, "1TIER").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_collection() {
        let repo = RejectingField {
            inner: LocalRepository::new(),
            field: "surveys",
        };
        // An earlier, complete copy of the collection.
        for field in Collection::ARTIFACT_FIELDS {
            repo.inner
                .store_artifact(&ArtifactKey::new("1TIER", field), &json!("old"))
                .await
                .unwrap();
        }
        let other = ArtifactKey::new("OTHER", "tiers");
        repo.inner.store_artifact(&other, &json!([])).await.unwrap();

        let err = store_collection(&repo, &collection()).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));

        assert_eq!(load_collection(&repo, "1TIER").await.unwrap(), None);
        for field in Collection::ARTIFACT_FIELDS {
            let key = ArtifactKey::new("1TIER", field);
            assert!(!repo.has_artifact(&key).await.unwrap(), "{} left behind", key);
        }
        assert!(repo.has_artifact(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_collection() {
        let repo = LocalRepository::new();
        store_collection(&repo, &collection()).await.unwrap();
        assert_eq!(delete_collection(&repo, "1TIER").await.unwrap(), Collection::ARTIFACT_FIELDS.len());
        assert_eq!(delete_collection(&repo, "1TIER").await.unwrap(), 0);
        assert!(list_collections(&repo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_store_is_an_error() {
        let repo = LocalRepository::new();
        repo.set_healthy(false).unwrap();
        assert!(!health_check(&repo).await.unwrap());
        assert!(store_collection(&repo, &collection()).await.is_err());
        assert!(load_collection(&repo, "1TIER").await.is_err());
    }
}

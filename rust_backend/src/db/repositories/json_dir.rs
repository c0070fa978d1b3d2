//! Directory-of-JSON artifact store.
//!
//! Every artifact is one file `<outdir>/<collection>_<field>.json`. Writes go
//! to a temporary sibling first and are renamed into place, so a reader never
//! sees a half-written artifact.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::domain::Collection;
use crate::db::repository::{ArtifactKey, ArtifactRepository, RepositoryError, RepositoryResult};

const EXTENSION: &str = "json";

/// Artifact store backed by a directory of JSON files.
#[derive(Debug, Clone)]
pub struct JsonDirRepository {
    outdir: PathBuf,
}

impl JsonDirRepository {
    /// Create a store rooted at `outdir`. The directory is created on the
    /// first write if it does not exist yet.
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
        }
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Path of the file holding `key`.
    pub fn artifact_path(&self, key: &ArtifactKey) -> PathBuf {
        self.outdir
            .join(format!("{}.{}", key.file_stem(), EXTENSION))
    }

    /// Recover the collection name from an artifact file name.
    fn collection_of(file_name: &str) -> Option<&str> {
        let stem = file_name.strip_suffix(".json")?;
        Collection::ARTIFACT_FIELDS.iter().find_map(|field| {
            stem.strip_suffix(field)
                .and_then(|rest| rest.strip_suffix('_'))
                .filter(|name| !name.is_empty())
        })
    }
}

fn io_error(context: &str, path: &Path, e: std::io::Error) -> RepositoryError {
    RepositoryError::IoError(format!("{} {}: {}", context, path.display(), e))
}

#[async_trait]
impl ArtifactRepository for JsonDirRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        match tokio::fs::metadata(&self.outdir).await {
            Ok(meta) => Ok(meta.is_dir()),
            // Not created yet; the first write will create it.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(io_error("Failed to stat", &self.outdir, e)),
        }
    }

    async fn store_artifact(&self, key: &ArtifactKey, value: &Value) -> RepositoryResult<()> {
        tokio::fs::create_dir_all(&self.outdir)
            .await
            .map_err(|e| io_error("Failed to create", &self.outdir, e))?;

        let path = self.artifact_path(key);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_error("Failed to write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("Failed to move into place", &path, e))?;
        debug!("Stored artifact {} at {}", key, path.display());
        Ok(())
    }

    async fn load_artifact(&self, key: &ArtifactKey) -> RepositoryResult<Value> {
        let path = self.artifact_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(format!(
                    "Artifact {} not found in {}",
                    key,
                    self.outdir.display()
                )))
            }
            Err(e) => return Err(io_error("Failed to read", &path, e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool> {
        let path = self.artifact_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed artifact {} at {}", key, path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("Failed to remove", &path, e)),
        }
    }

    async fn has_artifact(&self, key: &ArtifactKey) -> RepositoryResult<bool> {
        tokio::fs::try_exists(self.artifact_path(key))
            .await
            .map_err(|e| io_error("Failed to stat", &self.artifact_path(key), e))
    }

    async fn list_collections(&self) -> RepositoryResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.outdir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("Failed to list", &self.outdir, e)),
        };

        let mut names = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("Failed to list", &self.outdir, e))?
        {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(Self::collection_of) {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}

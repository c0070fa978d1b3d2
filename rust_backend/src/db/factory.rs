//! Repository factory.
//!
//! Creates an artifact store from runtime configuration.

use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "json-repo")]
use super::repositories::JsonDirRepository;
use super::repo_config::SummaryConfig;
use super::repositories::LocalRepository;
use super::repository::{ArtifactRepository, RepositoryError, RepositoryResult};

/// Repository type configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// In-memory store
    Local,
    /// Directory of JSON artifacts
    Json,
}

impl FromStr for RepositoryType {
    type Err = String;

    /// Parse repository type from string ("local", "json"), ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "memory" => Ok(Self::Local),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

/// Repository factory for creating store instances.
///
/// # Example
/// ```
/// use snana_summary::db::{RepositoryFactory, SummaryConfig};
///
/// let repo = RepositoryFactory::create(&SummaryConfig::in_memory()).unwrap();
/// # let _ = repo;
/// ```
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create the store named by `config.repository`.
    ///
    /// # Returns
    /// * `Ok(Arc<dyn ArtifactRepository>)` - Store instance
    /// * `Err(RepositoryError::ConfigurationError)` - Unknown type or missing outdir
    pub fn create(config: &SummaryConfig) -> RepositoryResult<Arc<dyn ArtifactRepository>> {
        match config.repository_type()? {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Json => {
                let outdir = config.repository.outdir.as_ref().ok_or_else(|| {
                    RepositoryError::ConfigurationError(
                        "json repository requires 'repository.outdir' setting".to_string(),
                    )
                })?;
                Self::create_json(outdir)
            }
        }
    }

    /// Create an in-memory store.
    pub fn create_local() -> Arc<dyn ArtifactRepository> {
        Arc::new(LocalRepository::new())
    }

    #[cfg(feature = "json-repo")]
    fn create_json(outdir: &std::path::Path) -> RepositoryResult<Arc<dyn ArtifactRepository>> {
        Ok(Arc::new(JsonDirRepository::new(outdir)))
    }

    #[cfg(not(feature = "json-repo"))]
    fn create_json(_outdir: &std::path::Path) -> RepositoryResult<Arc<dyn ArtifactRepository>> {
        Err(RepositoryError::ConfigurationError(
            "json repository support is not compiled in (enable feature 'json-repo')".to_string(),
        ))
    }
}

//! Summary configuration file support.
//!
//! This module reads `summary.toml`, which picks the artifact store and tunes
//! the reading pipeline.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::factory::RepositoryType;
use super::repository::RepositoryError;
use crate::services::zhist::DEFAULT_SNRMAX_CUT;

/// Summary configuration from file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub repository: RepositorySettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub scratch: ScratchSettings,
}

/// Artifact store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
    #[serde(default)]
    pub outdir: Option<PathBuf>,
}

/// Reading pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_snrmax_cut")]
    pub snrmax_cut: f64,
    /// Explicit scratch directory; skips the external lookup when set.
    #[serde(default)]
    pub snana_simdir: Option<PathBuf>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// External data-locating tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchSettings {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_snrmax_cut() -> f64 {
    DEFAULT_SNRMAX_CUT
}

fn default_max_parallel() -> usize {
    8
}

fn default_program() -> String {
    "snana.exe".to_string()
}

fn default_retries() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            snrmax_cut: default_snrmax_cut(),
            snana_simdir: None,
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for ScratchSettings {
    fn default() -> Self {
        Self {
            program: default_program(),
            retries: default_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ScratchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SummaryConfig {
    /// Configuration with an in-memory store and default pipeline settings.
    pub fn in_memory() -> Self {
        Self {
            repository: RepositorySettings {
                repo_type: "local".to_string(),
                outdir: None,
            },
            pipeline: PipelineSettings::default(),
            scratch: ScratchSettings::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(SummaryConfig)` if the file parses and validates
    /// * `Err(RepositoryError::ConfigurationError)` otherwise
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::ConfigurationError(format!("Failed to read config file: {}", e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self, RepositoryError> {
        let config: SummaryConfig = toml::from_str(content).map_err(|e| {
            RepositoryError::ConfigurationError(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `summary.toml` in:
    /// 1. Current directory
    /// 2. `rust_backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        let search_paths = [
            PathBuf::from("summary.toml"),
            PathBuf::from("rust_backend/summary.toml"),
            PathBuf::from("../summary.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::ConfigurationError(
            "No summary.toml found in standard locations".to_string(),
        ))
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, RepositoryError> {
        RepositoryType::from_str(&self.repository.repo_type).map_err(|e| {
            RepositoryError::ConfigurationError(format!("Invalid repository type: {}", e))
        })
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        let repo_type = self.repository_type()?;

        if repo_type == RepositoryType::Json {
            let missing = self
                .repository
                .outdir
                .as_ref()
                .map_or(true, |p| p.as_os_str().is_empty());
            if missing {
                return Err(RepositoryError::ConfigurationError(
                    "json repository requires 'repository.outdir' setting".to_string(),
                ));
            }
        }

        if !self.pipeline.snrmax_cut.is_finite() {
            return Err(RepositoryError::ConfigurationError(format!(
                "'pipeline.snrmax_cut' must be finite, got {}",
                self.pipeline.snrmax_cut
            )));
        }

        if self.pipeline.max_parallel == 0 {
            return Err(RepositoryError::ConfigurationError(
                "'pipeline.max_parallel' must be at least 1".to_string(),
            ));
        }

        if self.scratch.retries == 0 {
            return Err(RepositoryError::ConfigurationError(
                "'scratch.retries' must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

//! Artifact storage for summarized collections.
//!
//! Storage follows the repository pattern so backends can be swapped:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Pipeline (CollectionAssembler)                         │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs)                            │
//! │  - whole-collection store / load                        │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  ArtifactRepository trait (repository/)                 │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//!     │                                 │
//! ┌───▼──────────────┐     ┌──────────▼──────────────┐
//! │ JsonDirRepository│     │  LocalRepository        │
//! │ (files on disk)  │     │  (in-memory)            │
//! └──────────────────┘     └─────────────────────────┘
//! ```

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;
pub mod services;

pub use factory::{RepositoryFactory, RepositoryType};
pub use repo_config::SummaryConfig;
#[cfg(feature = "json-repo")]
pub use repositories::JsonDirRepository;
pub use repositories::LocalRepository;
pub use repository::{ArtifactKey, ArtifactRepository, RepositoryError, RepositoryResult};
pub use services::{
    delete_collection, health_check, list_collections, load_collection, store_collection,
};

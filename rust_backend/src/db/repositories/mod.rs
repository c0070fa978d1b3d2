//! Artifact store implementations.
//!
//! - `local`: in-memory store for unit tests and throwaway runs
//! - `json_dir`: one JSON file per artifact in an output directory

#[cfg(feature = "json-repo")]
pub mod json_dir;
pub mod local;

#[cfg(feature = "json-repo")]
pub use json_dir::JsonDirRepository;
pub use local::LocalRepository;

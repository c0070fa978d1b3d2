//! Survey-simulation summaries for SNANA campaign outputs.
//!
//! A campaign directory describes a design space of survey variants
//! (area × cadence × redshift-match). This crate reads the campaign
//! configuration and every variant's simulation outputs, builds redshift
//! and spectral histograms, joins the cosmology fit results, and persists
//! the resulting [`Collection`](core::Collection) as one JSON artifact per
//! top-level field.
//!
//! ```no_run
//! use snana_summary::db::SummaryConfig;
//! use snana_summary::pipeline::{CollectionAssembler, ReadOptions};
//!
//! # async fn run() -> snana_summary::error::SummaryResult<()> {
//! let config = SummaryConfig::from_default_location()?;
//! let assembler = CollectionAssembler::from_config(&config)?;
//! let collection = assembler
//!     .read_files("1TIER", "/campaign/output_1TIER".as_ref(), ReadOptions::default())
//!     .await?;
//! println!("{} variants", collection.surveys.len());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod db;
pub mod error;
pub mod parsing;
pub mod pipeline;
pub mod services;

pub use error::{SummaryError, SummaryResult};

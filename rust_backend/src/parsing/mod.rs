//! Parsers for SNANA campaign outputs.
//!
//! # Parsers
//!
//! - [`line_grammar`]: the text-line mini-languages of the campaign document
//! - [`config_parser`]: the `INP*` campaign document, instrument file and input discovery
//! - [`doc_block`]: `DOCUMENTATION:` headers of plain or gzip text files
//! - [`simlib_doc`]: per-tier exposure tables from a SIMLIB header
//! - [`readme`]: generator-type names from a variant README
//! - [`table`]: whitespace-delimited tables (dump, spectra, fit summary)
//! - [`filemap`]: the `ANALYSIS_INSTRUCTIONS.README` variant index
//!
//! # Example
//!
//! ```no_run
//! use snana_summary::parsing::config_parser::{read_campaign, validate_tier_axes};
//! use std::path::Path;
//!
//! let config = read_campaign(Path::new("output_1TIER")).expect("Failed to read campaign");
//! let axes = validate_tier_axes(&config.tiers).expect("Inconsistent tiers");
//! println!("{} survey variants", axes.len());
//! ```

pub mod config_parser;
pub mod doc_block;
pub mod filemap;
pub mod line_grammar;
pub mod readme;
pub mod simlib_doc;
pub mod table;


pub use config_parser::{read_campaign, CampaignConfig, VariantAxes};
pub use filemap::{FileMap, FileMapEntry, VariantIndex};
pub use table::WhitespaceTable;

//! Core domain model shared by the parsers, builders and assembler.
//!
//! - [`domain`]: collection, tiers, survey variants and their histograms
//! - [`gentype`]: generator-type codes and their canonical names

pub mod domain;
pub mod gentype;

pub use domain::{
    AnalysisInfo, Collection, CosmologyRecord, ForceSnrMax, MjdSeason, MuOpt, SparseCountTable,
    SpectralHistogramBundle, SurveyInfo, SurveyVariant, Tier, TierCandidateIds, TierExposure,
    TierSpectra, TimeFrame, ZHistogram, ZHistograms, KNOWN_FILTERS,
};
pub use gentype::{GenType, GenTypeMap};

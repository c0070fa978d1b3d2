//! Aggregation services.
//!
//! Each builder turns one kind of SNANA table into part of a
//! [`SurveyVariant`](crate::core::domain::SurveyVariant); `query` reads the
//! assembled result back out.

pub mod cosmology;
pub mod query;
pub mod spectra;
pub mod zhist;

pub use cosmology::FitSummary;
pub use query::{HistogramKind, QueryError};
pub use spectra::{SpectralSummary, BINNING};
pub use zhist::ZHistogramBuilder;

//! Data model for a summarized survey-simulation collection.
//!
//! A [`Collection`] is built once per read of an SNANA output directory and
//! owns everything below it: the parsed campaign configuration, the tier
//! geometry, one [`SurveyVariant`] per point of the area × cadence ×
//! redshift-match design space, and the spectroscopic candidate-ID sets.
//!
//! Field names on the serialized side follow the upstream SNANA keys
//! (`FORCE_SNRMAX`, `NLIBID`, `zSNRMATCH`, ...) because the JSON artifacts
//! are consumed by tools that already know those names.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::gentype::{GenType, GenTypeMap};
use crate::error::{SummaryError, SummaryResult};

/// Known SNANA filter alphabet, in the order the instrument lists them.
pub const KNOWN_FILTERS: [char; 7] = ['R', 'Z', 'Y', 'J', 'H', 'F', 'K'];

// =========================================================================
// Configuration records
// =========================================================================

/// One `FORCE_SNRMAX` entry: a forced S/N over a wavelength window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceSnrMax {
    pub snr: f64,
    pub lam0: f64,
    pub lam1: f64,
}

/// One observing season window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MjdSeason {
    pub season_mjd0: f64,
    pub season_mjd1: f64,
}

/// A distance-modulus fit option. Option 0 is always `standard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuOpt {
    pub name: String,
    pub idsurvey_select: i64,
}

impl MuOpt {
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            idsurvey_select: -99,
        }
    }
}

/// A named sky region with its cadence axes.
///
/// `relarea`, `dt_visit` and `z_snrmatch` are the three axes of the variant
/// cross product; their lengths must agree across every tier of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    pub bands: Vec<char>,
    pub relarea: Vec<i64>,
    pub dt_visit: Vec<f64>,
    pub z_snrmatch: Vec<f64>,
    #[serde(default)]
    pub texpose_prism: Vec<i64>,
}

/// The `CONFIG_SURVEY` block, with the mini-language fields parsed.
///
/// Keys this crate does not interpret are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyInfo {
    #[serde(rename = "FORCE_SNRMAX", default)]
    pub force_snrmax: Vec<ForceSnrMax>,
    #[serde(rename = "MJD_SEASON", default)]
    pub mjd_season: Vec<MjdSeason>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Instrument description, kept as the raw document.
pub type InstrInfo = Value;

/// The `CONFIG_ANALYSIS_PREP` block plus the derived `muopt` list and
/// `prescales` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    pub muopt: Vec<MuOpt>,
    pub prescales: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisInfo {
    /// Prescale for a canonical type name; 1.0 when not listed.
    pub fn prescale_for(&self, type_name: &str) -> f64 {
        self.prescales.get(type_name).copied().unwrap_or(1.0)
    }
}

// =========================================================================
// Per-variant records
// =========================================================================

/// Tier geometry and exposure times as documented in a variant's SIMLIB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierExposure {
    /// Exposure time per known filter; 0.0 for filters the tier does not use.
    pub bands: BTreeMap<String, f64>,
    pub ntile: i64,
    pub nvisit: i64,
    pub area: f64,
    pub dt_visit: f64,
    #[serde(rename = "NLIBID")]
    pub nlibid: i64,
    #[serde(rename = "zSNRMATCH")]
    pub z_snrmatch: f64,
    #[serde(rename = "OpenFrac")]
    pub open_frac: f64,
}

/// Flattened 3-key count table: one row per (tier, gentype, z bin).
///
/// Every combination is materialized, zero counts included, so consumers can
/// slice by `(tier, gentype)` and get a regular z axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZHistogram {
    pub tier: Vec<String>,
    pub gentype: Vec<GenType>,
    #[serde(rename = "zCMB_bin_low", alias = "zCMB")]
    pub zcmb_bin_low: Vec<f64>,
    pub n: Vec<f64>,
}

impl ZHistogram {
    pub fn push(&mut self, tier: &str, gentype: GenType, zcmb_bin_low: f64, n: f64) {
        self.tier.push(tier.to_string());
        self.gentype.push(gentype);
        self.zcmb_bin_low.push(zcmb_bin_low);
        self.n.push(n);
    }

    pub fn len(&self) -> usize {
        self.n.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n.is_empty()
    }

    /// Count in the bin starting at `zcmb_bin_low` for a tier/gentype, if present.
    pub fn count(&self, tier: &str, gentype: GenType, zcmb_bin_low: f64) -> Option<f64> {
        (0..self.len())
            .find(|&i| {
                self.tier[i] == tier
                    && self.gentype[i] == gentype
                    && (self.zcmb_bin_low[i] - zcmb_bin_low).abs() < 1e-9
            })
            .map(|i| self.n[i])
    }
}

/// The four parallel redshift histograms of a variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZHistograms {
    #[serde(rename = "zhist")]
    pub all: ZHistogram,
    #[serde(rename = "snrmaxzhist")]
    pub snrmax: ZHistogram,
    #[serde(rename = "snrmax2zhist")]
    pub snrmax2: ZHistogram,
    #[serde(rename = "snrmax3zhist")]
    pub snrmax3: ZHistogram,
}

/// Whether a spectral count table is binned on observed- or rest-frame time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFrame {
    #[default]
    Observed,
    Rest,
}

/// Sparse 5-key count table for one band, only non-empty bins present.
///
/// Rows are sorted by `(gentype, zbin, tbin, magbin, snrbin)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "SparseTableWire", from = "SparseTableWire")]
pub struct SparseCountTable {
    pub frame: TimeFrame,
    pub gentype: Vec<GenType>,
    pub zbin: Vec<i64>,
    pub tbin: Vec<i64>,
    pub magbin: Vec<i64>,
    pub snrbin: Vec<i64>,
    pub n: Vec<u64>,
}

/// Key of one sparse bin: `(gentype, zbin, tbin, magbin, snrbin)`.
pub type SparseBinKey = (GenType, i64, i64, i64, i64);

impl SparseCountTable {
    /// Flatten grouped counts into parallel columns.
    pub fn from_counts(frame: TimeFrame, counts: BTreeMap<SparseBinKey, u64>) -> Self {
        let mut table = SparseCountTable {
            frame,
            ..Default::default()
        };
        for ((gentype, zbin, tbin, magbin, snrbin), n) in counts {
            if n == 0 {
                continue;
            }
            table.gentype.push(gentype);
            table.zbin.push(zbin);
            table.tbin.push(tbin);
            table.magbin.push(magbin);
            table.snrbin.push(snrbin);
            table.n.push(n);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.n.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.n.iter().sum()
    }
}

/// Serialized layout; the time column is `tbin` or `trestbin` by frame.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SparseTableWire {
    Observed {
        #[serde(rename = "GENTYPE")]
        gentype: Vec<GenType>,
        zbin: Vec<i64>,
        tbin: Vec<i64>,
        magbin: Vec<i64>,
        snrbin: Vec<i64>,
        n: Vec<u64>,
    },
    Rest {
        #[serde(rename = "GENTYPE")]
        gentype: Vec<GenType>,
        zbin: Vec<i64>,
        trestbin: Vec<i64>,
        magbin: Vec<i64>,
        snrbin: Vec<i64>,
        n: Vec<u64>,
    },
}

impl From<SparseCountTable> for SparseTableWire {
    fn from(t: SparseCountTable) -> Self {
        match t.frame {
            TimeFrame::Observed => SparseTableWire::Observed {
                gentype: t.gentype,
                zbin: t.zbin,
                tbin: t.tbin,
                magbin: t.magbin,
                snrbin: t.snrbin,
                n: t.n,
            },
            TimeFrame::Rest => SparseTableWire::Rest {
                gentype: t.gentype,
                zbin: t.zbin,
                trestbin: t.tbin,
                magbin: t.magbin,
                snrbin: t.snrbin,
                n: t.n,
            },
        }
    }
}

impl From<SparseTableWire> for SparseCountTable {
    fn from(w: SparseTableWire) -> Self {
        match w {
            SparseTableWire::Observed {
                gentype,
                zbin,
                tbin,
                magbin,
                snrbin,
                n,
            } => SparseCountTable {
                frame: TimeFrame::Observed,
                gentype,
                zbin,
                tbin,
                magbin,
                snrbin,
                n,
            },
            SparseTableWire::Rest {
                gentype,
                zbin,
                trestbin,
                magbin,
                snrbin,
                n,
            } => SparseCountTable {
                frame: TimeFrame::Rest,
                gentype,
                zbin,
                tbin: trestbin,
                magbin,
                snrbin,
                n,
            },
        }
    }
}

/// Spectral counts for one tier under one strategy.
///
/// `bands` holds `<band>` and `<band>_restframe` tables side by side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSpectra {
    pub texpose: i64,
    #[serde(flatten)]
    pub bands: BTreeMap<String, SparseCountTable>,
}

/// Spectral histograms of a variant with their global binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralHistogramBundle {
    pub zmin: f64,
    pub zmax: f64,
    pub deltaz: f64,
    pub tobsmin: f64,
    pub tobsmax: f64,
    pub deltat: f64,
    pub mmin: f64,
    pub mmax: f64,
    pub deltam: f64,
    pub snrmin: f64,
    pub snrmax: f64,
    pub deltasnr: f64,
    pub nspecstrategies: usize,
    /// Indexed by strategy, then keyed by tier name.
    pub spectrumhists: Vec<BTreeMap<String, TierSpectra>>,
}

/// Per tier, the object IDs observed under each spectroscopic strategy.
pub type TierCandidateIds = BTreeMap<String, Vec<BTreeSet<i64>>>;

/// One joined row of the fit-summary table.
///
/// All columns are kept; the raw `FoM` column is stored as `FoM_stat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CosmologyRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl CosmologyRecord {
    pub const FOM_KEY: &'static str = "FoM_stat";

    pub fn fom_stat(&self) -> Option<f64> {
        self.fields.get(Self::FOM_KEY).and_then(Value::as_f64)
    }
}

/// One point of the area × cadence × redshift-match design space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyVariant {
    pub tiers: BTreeMap<String, TierExposure>,
    pub gentypemap: GenTypeMap,
    #[serde(flatten)]
    pub zhists: ZHistograms,
    pub long_survey_version: String,
    #[serde(default)]
    pub spechists: Option<SpectralHistogramBundle>,
    #[serde(default)]
    pub muopt: Vec<CosmologyRecord>,
}

// =========================================================================
// Collection
// =========================================================================

/// A fully assembled collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub name: String,
    pub surveyinfo: SurveyInfo,
    pub instrinfo: InstrInfo,
    pub analysisinfo: AnalysisInfo,
    pub tiers: Vec<Tier>,
    pub surveys: BTreeMap<String, SurveyVariant>,
    pub spectiercids: BTreeMap<String, TierCandidateIds>,
}

impl Collection {
    /// Names of the individually persisted fields, in persistence order.
    pub const ARTIFACT_FIELDS: [&'static str; 6] = [
        "surveyinfo",
        "instrinfo",
        "analysisinfo",
        "tiers",
        "surveys",
        "spectiercids",
    ];

    /// Serialize each persisted field separately.
    pub fn to_artifacts(&self) -> SummaryResult<Vec<(&'static str, Value)>> {
        Ok(vec![
            ("surveyinfo", serde_json::to_value(&self.surveyinfo)?),
            ("instrinfo", self.instrinfo.clone()),
            ("analysisinfo", serde_json::to_value(&self.analysisinfo)?),
            ("tiers", serde_json::to_value(&self.tiers)?),
            ("surveys", serde_json::to_value(&self.surveys)?),
            ("spectiercids", serde_json::to_value(&self.spectiercids)?),
        ])
    }

    /// Rebuild a collection from its persisted fields.
    pub fn from_artifacts(
        name: &str,
        mut artifacts: BTreeMap<String, Value>,
    ) -> SummaryResult<Self> {
        let mut take = |field: &str| {
            artifacts.remove(field).ok_or_else(|| {
                SummaryError::Consistency(format!(
                    "artifact {} missing for collection {}",
                    field, name
                ))
            })
        };

        Ok(Collection {
            name: name.to_string(),
            surveyinfo: serde_json::from_value(take("surveyinfo")?)?,
            instrinfo: take("instrinfo")?,
            analysisinfo: serde_json::from_value(take("analysisinfo")?)?,
            tiers: serde_json::from_value(take("tiers")?)?,
            surveys: serde_json::from_value(take("surveys")?)?,
            spectiercids: serde_json::from_value(take("spectiercids")?)?,
        })
    }

    pub fn tier(&self, name: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

//! Read-side selection over an assembled [`Collection`].
//!
//! These helpers back whatever presents the summaries (plots, tables, an
//! HTTP layer). Invalid user input is reported through [`QueryError`].

use std::collections::BTreeSet;
use std::fmt;

use crate::core::domain::{Collection, SurveyVariant, TierSpectra, ZHistogram, ZHistograms};
use crate::core::gentype::GenType;

/// Name that selects every generator type.
pub const ALL_TYPES: &str = "all";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Unknown survey: {0}")]
    UnknownSurvey(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Unknown generator type: {0}")]
    UnknownGenType(String),

    #[error("Unknown histogram kind: {0}")]
    UnknownHistogramKind(i64),

    #[error("Strategy {index} out of range ({count} strategies)")]
    StrategyOutOfRange { index: usize, count: usize },

    #[error("Survey {0} has no spectral histograms")]
    NoSpectra(String),
}

/// Which of the four redshift histograms to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramKind {
    All = 0,
    SnrMax = 1,
    SnrMax2 = 2,
    SnrMax3 = 3,
}

impl TryFrom<i64> for HistogramKind {
    type Error = QueryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HistogramKind::All),
            1 => Ok(HistogramKind::SnrMax),
            2 => Ok(HistogramKind::SnrMax2),
            3 => Ok(HistogramKind::SnrMax3),
            other => Err(QueryError::UnknownHistogramKind(other)),
        }
    }
}

impl fmt::Display for HistogramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HistogramKind::All => "all",
            HistogramKind::SnrMax => "SNRMAX",
            HistogramKind::SnrMax2 => "SNRMAX2",
            HistogramKind::SnrMax3 => "SNRMAX3",
        };
        write!(f, "{}", label)
    }
}

impl HistogramKind {
    pub fn select(self, hists: &ZHistograms) -> &ZHistogram {
        match self {
            HistogramKind::All => &hists.all,
            HistogramKind::SnrMax => &hists.snrmax,
            HistogramKind::SnrMax2 => &hists.snrmax2,
            HistogramKind::SnrMax3 => &hists.snrmax3,
        }
    }
}

/// Redshift counts of one `(tier, gentype)` slice.
#[derive(Debug, Clone, PartialEq)]
pub struct ZSeries {
    pub tier: String,
    pub gentype: GenType,
    pub type_name: String,
    pub zcmb_bin_low: Vec<f64>,
    pub n: Vec<f64>,
}

pub fn survey<'a>(collection: &'a Collection, name: &str) -> Result<&'a SurveyVariant, QueryError> {
    collection
        .surveys
        .get(name)
        .ok_or_else(|| QueryError::UnknownSurvey(name.to_string()))
}

/// Select redshift series by kind, type names (or [`ALL_TYPES`]) and
/// optionally a single tier.
pub fn select_zhist(
    collection: &Collection,
    survey_name: &str,
    kind: HistogramKind,
    type_names: &[&str],
    tier: Option<&str>,
) -> Result<Vec<ZSeries>, QueryError> {
    let variant = survey(collection, survey_name)?;
    if let Some(tier) = tier {
        if collection.tier(tier).is_none() {
            return Err(QueryError::UnknownTier(tier.to_string()));
        }
    }

    let mut codes: BTreeSet<GenType> = BTreeSet::new();
    for name in type_names {
        if *name == ALL_TYPES {
            codes.extend(variant.gentypemap.codes());
            continue;
        }
        let matching: Vec<GenType> = variant
            .gentypemap
            .iter()
            .filter(|(_, n)| n == name)
            .map(|(code, _)| code)
            .collect();
        if matching.is_empty() {
            return Err(QueryError::UnknownGenType(name.to_string()));
        }
        codes.extend(matching);
    }

    let hist = kind.select(&variant.zhists);
    let mut series: Vec<ZSeries> = Vec::new();
    for i in 0..hist.len() {
        let row_tier = hist.tier[i].as_str();
        let gentype = hist.gentype[i];
        if !codes.contains(&gentype) || tier.is_some_and(|t| t != row_tier) {
            continue;
        }
        let position = series
            .iter()
            .position(|s| s.tier == row_tier && s.gentype == gentype);
        let slot = match position {
            Some(p) => &mut series[p],
            None => {
                series.push(ZSeries {
                    tier: row_tier.to_string(),
                    gentype,
                    type_name: variant.gentypemap.name(gentype).unwrap_or_default().to_string(),
                    zcmb_bin_low: Vec::new(),
                    n: Vec::new(),
                });
                let last = series.len() - 1;
                &mut series[last]
            }
        };
        slot.zcmb_bin_low.push(hist.zcmb_bin_low[i]);
        slot.n.push(hist.n[i]);
    }
    Ok(series)
}

/// Spectral counts for one strategy and tier.
pub fn spectral_entry<'a>(
    collection: &'a Collection,
    survey_name: &str,
    strategy: usize,
    tier: &str,
) -> Result<&'a TierSpectra, QueryError> {
    let variant = survey(collection, survey_name)?;
    let bundle = variant
        .spechists
        .as_ref()
        .ok_or_else(|| QueryError::NoSpectra(survey_name.to_string()))?;
    let per_tier = bundle
        .spectrumhists
        .get(strategy)
        .ok_or(QueryError::StrategyOutOfRange {
            index: strategy,
            count: bundle.spectrumhists.len(),
        })?;
    per_tier
        .get(tier)
        .ok_or_else(|| QueryError::UnknownTier(tier.to_string()))
}

/// Object IDs observed in `tier` under `strategy`.
pub fn candidate_ids<'a>(
    collection: &'a Collection,
    survey_name: &str,
    tier: &str,
    strategy: usize,
) -> Result<&'a BTreeSet<i64>, QueryError> {
    let per_tier = collection
        .spectiercids
        .get(survey_name)
        .ok_or_else(|| QueryError::UnknownSurvey(survey_name.to_string()))?;
    let strategies = per_tier
        .get(tier)
        .ok_or_else(|| QueryError::UnknownTier(tier.to_string()))?;
    strategies.get(strategy).ok_or(QueryError::StrategyOutOfRange {
        index: strategy,
        count: strategies.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        AnalysisInfo, SpectralHistogramBundle, SurveyInfo, Tier, TierCandidateIds,
    };
    use crate::core::gentype::GenTypeMap;
    use std::collections::BTreeMap;

    fn collection() -> Collection {
        let mut gentypemap = GenTypeMap::new();
        gentypemap.insert(GenType(10), "Ia");
        gentypemap.insert(GenType(20), "IIP");
        gentypemap.insert(GenType(21), "IIP");

        let mut zhists = ZHistograms::default();
        for tier in ["DEEP", "WIDE"] {
            for (i, z) in [0.0, 0.1].iter().enumerate() {
                for code in [10, 20, 21] {
                    zhists.all.push(tier, GenType(code), *z, (code + i as i64) as f64);
                    zhists.snrmax.push(tier, GenType(code), *z, 1.0);
                }
            }
        }

        let mut spectrumhists = BTreeMap::new();
        spectrumhists.insert(
            "DEEP".to_string(),
            TierSpectra {
                texpose: 900,
                bands: BTreeMap::new(),
            },
        );
        let bundle = SpectralHistogramBundle {
            zmin: 0.0,
            zmax: 3.0,
            deltaz: 0.2,
            tobsmin: -33.0,
            tobsmax: 243.0,
            deltat: 10.0,
            mmin: 20.0,
            mmax: 28.0,
            deltam: 1.0,
            snrmin: 0.0,
            snrmax: 20.0,
            deltasnr: 1.0,
            nspecstrategies: 1,
            spectrumhists: vec![spectrumhists],
        };

        let mut surveys = BTreeMap::new();
        surveys.insert(
            "T A0".to_string(),
            SurveyVariant {
                tiers: BTreeMap::new(),
                gentypemap,
                zhists,
                long_survey_version: "ROMAN_T_DATA-A0".to_string(),
                spechists: Some(bundle),
                muopt: vec![],
            },
        );

        let mut cids: TierCandidateIds = BTreeMap::new();
        cids.insert("DEEP".to_string(), vec![BTreeSet::from([3, 5])]);
        let mut spectiercids = BTreeMap::new();
        spectiercids.insert("T A0".to_string(), cids);

        let tier = |name: &str| Tier {
            name: name.to_string(),
            ra: 0.0,
            dec: 0.0,
            bands: vec![],
            relarea: vec![1],
            dt_visit: vec![5.0],
            z_snrmatch: vec![0.5],
            texpose_prism: vec![900],
        };

        Collection {
            name: "T".to_string(),
            surveyinfo: SurveyInfo::default(),
            instrinfo: serde_json::Value::Null,
            analysisinfo: AnalysisInfo::default(),
            tiers: vec![tier("DEEP"), tier("WIDE")],
            surveys,
            spectiercids,
        }
    }

    #[test]
    fn test_histogram_kind_from_int() {
        assert_eq!(HistogramKind::try_from(2).unwrap(), HistogramKind::SnrMax2);
        assert_eq!(
            HistogramKind::try_from(4),
            Err(QueryError::UnknownHistogramKind(4))
        );
    }

    #[test]
    fn test_select_by_name_and_tier() {
        let c = collection();
        let series = select_zhist(&c, "T A0", HistogramKind::All, &["IIP"], Some("WIDE")).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|s| s.tier == "WIDE" && s.type_name == "IIP"));
        assert_eq!(series[0].zcmb_bin_low, vec![0.0, 0.1]);
        assert_eq!(series[0].n, vec![20.0, 21.0]);
    }

    #[test]
    fn test_select_all_types() {
        let c = collection();
        let series = select_zhist(&c, "T A0", HistogramKind::SnrMax, &[ALL_TYPES], None).unwrap();
        assert_eq!(series.len(), 6);
        assert!(series.iter().all(|s| s.n == vec![1.0, 1.0]));
    }

    #[test]
    fn test_select_errors() {
        let c = collection();
        assert_eq!(
            select_zhist(&c, "nope", HistogramKind::All, &[ALL_TYPES], None),
            Err(QueryError::UnknownSurvey("nope".to_string()))
        );
        assert_eq!(
            select_zhist(&c, "T A0", HistogramKind::All, &["SLSN"], None),
            Err(QueryError::UnknownGenType("SLSN".to_string()))
        );
        assert_eq!(
            select_zhist(&c, "T A0", HistogramKind::All, &["Ia"], Some("MED")),
            Err(QueryError::UnknownTier("MED".to_string()))
        );
    }

    #[test]
    fn test_spectral_lookup() {
        let c = collection();
        assert_eq!(spectral_entry(&c, "T A0", 0, "DEEP").unwrap().texpose, 900);
        assert_eq!(
            spectral_entry(&c, "T A0", 1, "DEEP"),
            Err(QueryError::StrategyOutOfRange { index: 1, count: 1 })
        );
        assert!(matches!(
            spectral_entry(&c, "T A0", 0, "WIDE"),
            Err(QueryError::UnknownTier(_))
        ));
    }

    #[test]
    fn test_candidate_ids() {
        let c = collection();
        assert_eq!(candidate_ids(&c, "T A0", "DEEP", 0).unwrap(), &BTreeSet::from([3, 5]));
        assert!(candidate_ids(&c, "T A0", "DEEP", 1).is_err());
        assert!(candidate_ids(&c, "T A0", "WIDE", 0).is_err());
    }
}

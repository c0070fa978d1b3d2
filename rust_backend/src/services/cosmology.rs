//! Join of the BBC fit summary onto survey variants.
//!
//! `BBC_SUMMARY_wfit0.FITRES` has one row per (variant `VERSION`, `MUOPT`)
//! for a single `FITOPT`. Each variant receives its rows ordered by `MUOPT`,
//! with the `FoM` column renamed to `FoM_stat`.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::domain::{CosmologyRecord, SurveyVariant};
use crate::error::{SummaryError, SummaryResult};
use crate::parsing::table::{parse_int_cell, WhitespaceTable};

const FOM_COLUMN: &str = "FoM";

/// Parsed fit-summary table.
#[derive(Debug, Clone)]
pub struct FitSummary {
    records: Vec<(String, i64, CosmologyRecord)>,
    muopts: BTreeSet<i64>,
}

fn cell_value(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    cell.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

impl FitSummary {
    pub fn read(path: &Path) -> SummaryResult<Self> {
        log::debug!("Reading {}", path.display());
        Self::from_table(&WhitespaceTable::read(path)?)
    }

    /// Validate the table: a single `FITOPT` equal to 0 and integer `MUOPT`s.
    pub fn from_table(table: &WhitespaceTable) -> SummaryResult<Self> {
        table.require_columns(&["FITOPT", "MUOPT", "VERSION", FOM_COLUMN])?;

        let fitopts: BTreeSet<i64> = table.column_with("FITOPT", parse_int_cell)?.into_iter().collect();
        match fitopts.iter().copied().collect::<Vec<i64>>().as_slice() {
            [0] => {}
            [other] => {
                return Err(SummaryError::Cosmology(format!("FITOPT is {}, not 0", other)));
            }
            [] => return Err(SummaryError::Cosmology("fit summary has no rows".to_string())),
            many => {
                return Err(SummaryError::Cosmology(format!(
                    "there is more than one FITOPT: {:?}",
                    many
                )))
            }
        }

        let muopt_column = table.column_with("MUOPT", parse_int_cell)?;
        let versions = table.column_str("VERSION")?;

        let records = table
            .rows()
            .enumerate()
            .map(|(i, row)| {
                let fields = row
                    .into_iter()
                    .filter(|(name, _)| !name.ends_with(':'))
                    .map(|(name, cell)| {
                        let key = if name == FOM_COLUMN {
                            CosmologyRecord::FOM_KEY
                        } else {
                            name
                        };
                        (key.to_string(), cell_value(cell))
                    })
                    .collect();
                (
                    versions[i].to_string(),
                    muopt_column[i],
                    CosmologyRecord { fields },
                )
            })
            .collect();

        Ok(Self {
            records,
            muopts: muopt_column.into_iter().collect(),
        })
    }

    /// Rows for one variant identity, ordered by mu-option ordinal.
    ///
    /// Exactly one row must match each `(version, ordinal)`.
    pub fn records_for(&self, version: &str, n_muopt: usize) -> SummaryResult<Vec<CosmologyRecord>> {
        (0..n_muopt as i64)
            .map(|muopt| {
                let mut matches = self
                    .records
                    .iter()
                    .filter(|(v, m, _)| v == version && *m == muopt);
                match (matches.next(), matches.next()) {
                    (Some((_, _, record)), None) => Ok(record.clone()),
                    _ => Err(SummaryError::Cosmology(format!(
                        "Found {} lines in BBC file for {}, muopt={}",
                        self.records
                            .iter()
                            .filter(|(v, m, _)| v == version && *m == muopt)
                            .count(),
                        version,
                        muopt
                    ))),
                }
            })
            .collect()
    }

    /// Check that the ordinals in the table are exactly `0..n_muopt`.
    pub fn check_muopts(&self, n_muopt: usize) -> SummaryResult<()> {
        let expected: BTreeSet<i64> = (0..n_muopt as i64).collect();
        if self.muopts != expected {
            return Err(SummaryError::Cosmology(format!(
                "MUOPT values {:?} in fit summary, expected 0..{}",
                self.muopts, n_muopt
            )));
        }
        Ok(())
    }

    /// Attach cosmology records to every variant, keyed by `long_survey_version`.
    pub fn join(&self, n_muopt: usize, variants: &mut BTreeMap<String, SurveyVariant>) -> SummaryResult<()> {
        self.check_muopts(n_muopt)?;
        for variant in variants.values_mut() {
            variant.muopt = self.records_for(&variant.long_survey_version, n_muopt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{TierExposure, ZHistograms};
    use crate::core::gentype::GenTypeMap;

    const FITRES: &str = "\
# BBC summary
VARNAMES: ROW FITOPT MUOPT VERSION w wsig_marg FoM
ROW: 1 0 0 ROMAN_T_DATA-A0 -1.01 0.05 310.5
ROW: 2 0 1 ROMAN_T_DATA-A0 -0.98 0.06 250
ROW: 3 0 0 ROMAN_T_DATA-A1 -1.00 0.04 400.25
ROW: 4 0 1 ROMAN_T_DATA-A1 -0.99 0.05 350.0
";

    fn summary(text: &str) -> SummaryResult<FitSummary> {
        let table = WhitespaceTable::parse_str(Path::new("BBC.FITRES"), text)?;
        FitSummary::from_table(&table)
    }

    fn variant(version: &str) -> SurveyVariant {
        SurveyVariant {
            tiers: BTreeMap::<String, TierExposure>::new(),
            gentypemap: GenTypeMap::new(),
            zhists: ZHistograms::default(),
            long_survey_version: version.to_string(),
            spechists: None,
            muopt: Vec::new(),
        }
    }

    #[test]
    fn test_join_orders_by_muopt() {
        let fit = summary(FITRES).unwrap();
        let mut variants = BTreeMap::new();
        variants.insert("T A0".to_string(), variant("ROMAN_T_DATA-A0"));
        variants.insert("T A1".to_string(), variant("ROMAN_T_DATA-A1"));

        fit.join(2, &mut variants).unwrap();
        let a0 = &variants["T A0"].muopt;
        assert_eq!(a0.len(), 2);
        assert_eq!(a0[0].fom_stat(), Some(310.5));
        assert_eq!(a0[1].fom_stat(), Some(250.0));
        assert_eq!(a0[1].fields["MUOPT"], 1);
        assert_eq!(a0[0].fields["VERSION"], "ROMAN_T_DATA-A0");
        assert!(!a0[0].fields.contains_key("FoM"));
        assert!(!a0[0].fields.contains_key("VARNAMES:"));
        assert_eq!(variants["T A1"].muopt[0].fom_stat(), Some(400.25));
    }

    #[test]
    fn test_multiple_fitopts() {
        let text = FITRES.replace("ROW: 4 0 1", "ROW: 4 1 1");
        let err = summary(&text).unwrap_err();
        assert!(err.to_string().contains("more than one FITOPT"));
    }

    #[test]
    fn test_nonzero_fitopt() {
        let text = FITRES.replace(" 0 0 ", " 2 0 ").replace(" 0 1 ", " 2 1 ");
        assert!(matches!(summary(&text), Err(SummaryError::Cosmology(_))));
    }

    #[test]
    fn test_muopt_ordinals_must_match() {
        let fit = summary(FITRES).unwrap();
        assert!(fit.check_muopts(2).is_ok());
        assert!(fit.check_muopts(3).is_err());
        let mut variants = BTreeMap::new();
        assert!(fit.join(1, &mut variants).is_err());
    }

    #[test]
    fn test_ambiguous_or_missing_row() {
        let dup = format!("{}ROW: 5 0 0 ROMAN_T_DATA-A0 -1.0 0.1 1.0\n", FITRES);
        let fit = summary(&dup).unwrap();
        let err = fit.records_for("ROMAN_T_DATA-A0", 2).unwrap_err();
        assert!(err.to_string().contains("Found 2 lines"));

        let fit = summary(FITRES).unwrap();
        let err = fit.records_for("ROMAN_T_DATA-A9", 2).unwrap_err();
        assert!(err.to_string().contains("Found 0 lines"));
    }
}

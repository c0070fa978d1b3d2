//! Redshift histograms from a variant's object dump (`<VERSION>.DUMP`).
//!
//! Four parallel histograms are built over 31 bins of width 0.1 covering
//! `[0, 3.1)`: all objects, and objects whose `SNRMAX`, `SNRMAX2` or
//! `SNRMAX3` exceeds the cut. Every field × bin × gentype row is emitted,
//! zeros included, so each `(tier, gentype)` slice has a complete z axis.

use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::core::domain::{ZHistogram, ZHistograms};
use crate::core::gentype::{GenType, GenTypeMap};
use crate::parsing::doc_block::resolve_with_gz;
use crate::parsing::table::{unique_in_order, WhitespaceTable};

/// Number of redshift bins.
pub const ZBIN_COUNT: usize = 31;

/// Default threshold for the three gated histograms.
pub const DEFAULT_SNRMAX_CUT: f64 = 5.0;

/// Lower edge of redshift bin `i`.
pub fn zbin_low(i: usize) -> f64 {
    i as f64 / 10.0
}

/// Bin holding `z`, using half-open `[low, high)` bins.
pub fn zbin_index(z: f64) -> Option<usize> {
    if !(z >= 0.0) || z >= zbin_low(ZBIN_COUNT) {
        return None;
    }
    let guess = (z * 10.0).floor() as usize;
    let lo = guess.saturating_sub(1);
    let hi = (guess + 1).min(ZBIN_COUNT - 1);
    (lo..=hi).find(|&i| z >= zbin_low(i) && z < zbin_low(i + 1))
}

/// One object of the dump table.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpRow {
    pub field: String,
    pub gentype: GenType,
    pub zcmb: f64,
    /// `SNRMAX`, `SNRMAX2`, `SNRMAX3`.
    pub snrmax: [f64; 3],
}

/// Read the dump table at `path` (or `path.gz`).
pub fn read_dump(path: &Path) -> Result<Vec<DumpRow>> {
    let resolved = resolve_with_gz(path)
        .ok_or_else(|| anyhow!("Can't find {} or {}.gz", path.display(), path.display()))?;
    log::debug!("Reading dump table {}", resolved.display());

    let table = WhitespaceTable::read(&resolved)?;
    dump_rows(&table).with_context(|| format!("Bad dump table {}", resolved.display()))
}

/// Extract the histogrammed columns of a dump table.
pub fn dump_rows(table: &WhitespaceTable) -> Result<Vec<DumpRow>> {
    let fields = table.column_str("FIELD")?;
    let gentypes = table.column_with("GENTYPE", |c| c.parse::<GenType>().ok())?;
    let zcmb = table.column::<f64>("ZCMB")?;
    let snr1 = table.column::<f64>("SNRMAX")?;
    let snr2 = table.column::<f64>("SNRMAX2")?;
    let snr3 = table.column::<f64>("SNRMAX3")?;

    Ok((0..table.len())
        .map(|i| DumpRow {
            field: fields[i].to_string(),
            gentype: gentypes[i],
            zcmb: zcmb[i],
            snrmax: [snr1[i], snr2[i], snr3[i]],
        })
        .collect())
}

/// Builds the zhist family with a configurable S/N threshold.
#[derive(Debug, Clone, Copy)]
pub struct ZHistogramBuilder {
    snrmax_cut: f64,
}

impl Default for ZHistogramBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SNRMAX_CUT)
    }
}

impl ZHistogramBuilder {
    pub fn new(snrmax_cut: f64) -> Self {
        Self { snrmax_cut }
    }

    pub fn snrmax_cut(&self) -> f64 {
        self.snrmax_cut
    }

    /// Read a dump file and histogram it.
    pub fn build_from_file(
        &self,
        path: &Path,
        gentypemap: &GenTypeMap,
        prescales: &BTreeMap<String, f64>,
    ) -> Result<ZHistograms> {
        let rows = read_dump(path)?;
        Ok(self.build(&rows, gentypemap, prescales))
    }

    /// Histogram dump rows.
    ///
    /// Fields are emitted in first-seen order, gentypes in code order. Rows
    /// whose gentype is not in `gentypemap`, or whose redshift falls outside
    /// the binned range, are not counted. Counts are scaled by the prescale
    /// of the gentype's canonical name (1.0 when absent).
    pub fn build(
        &self,
        rows: &[DumpRow],
        gentypemap: &GenTypeMap,
        prescales: &BTreeMap<String, f64>,
    ) -> ZHistograms {
        // (field, gentype, zbin) -> [all, snrmax, snrmax2, snrmax3]
        let mut counts: HashMap<(&str, GenType, usize), [u64; 4]> = HashMap::new();
        for row in rows {
            let Some(bin) = zbin_index(row.zcmb) else {
                continue;
            };
            let entry = counts
                .entry((row.field.as_str(), row.gentype, bin))
                .or_insert([0; 4]);
            entry[0] += 1;
            for (k, snr) in row.snrmax.iter().enumerate() {
                if *snr > self.snrmax_cut {
                    entry[k + 1] += 1;
                }
            }
        }

        let field_names: Vec<&str> = rows.iter().map(|r| r.field.as_str()).collect();
        let fields = unique_in_order(&field_names);

        let mut hists = ZHistograms::default();
        for field in fields {
            for bin in 0..ZBIN_COUNT {
                let zlow = zbin_low(bin);
                for (gentype, name) in gentypemap.iter() {
                    let prescale = prescales.get(name).copied().unwrap_or(1.0);
                    let n = counts.get(&(field, gentype, bin)).copied().unwrap_or([0; 4]);
                    let targets: [&mut ZHistogram; 4] = [
                        &mut hists.all,
                        &mut hists.snrmax,
                        &mut hists.snrmax2,
                        &mut hists.snrmax3,
                    ];
                    for (hist, count) in targets.into_iter().zip(n) {
                        hist.push(field, gentype, zlow, prescale * count as f64);
                    }
                }
            }
        }
        hists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gentypes() -> GenTypeMap {
        let mut map = GenTypeMap::new();
        map.insert(GenType(10), "Ia");
        map.insert(GenType(20), "IIP+IIL");
        map
    }

    fn row(field: &str, gentype: i64, z: f64, snr: f64) -> DumpRow {
        DumpRow {
            field: field.to_string(),
            gentype: GenType(gentype),
            zcmb: z,
            snrmax: [snr, snr, snr],
        }
    }

    #[test]
    fn test_zbin_edges() {
        assert_eq!(zbin_index(0.0), Some(0));
        assert_eq!(zbin_index(0.1), Some(1));
        assert_eq!(zbin_index(0.25), Some(2));
        assert_eq!(zbin_index(0.3), Some(3));
        assert_eq!(zbin_index(3.05), Some(30));
        assert_eq!(zbin_index(3.1), None);
        assert_eq!(zbin_index(-0.01), None);
        assert_eq!(zbin_index(f64::NAN), None);
    }

    #[test]
    fn test_single_deep_row() {
        let rows = vec![DumpRow {
            field: "DEEP".to_string(),
            gentype: GenType(10),
            zcmb: 0.25,
            snrmax: [6.0, 4.0, 5.0],
        }];
        let hists = ZHistogramBuilder::default().build(&rows, &gentypes(), &BTreeMap::new());

        assert_eq!(hists.all.len(), 2 * ZBIN_COUNT);
        assert_eq!(hists.all.count("DEEP", GenType(10), 0.2), Some(1.0));
        assert_eq!(hists.snrmax.count("DEEP", GenType(10), 0.2), Some(1.0));
        // 4.0 and 5.0 are not strictly above the cut
        assert_eq!(hists.snrmax2.count("DEEP", GenType(10), 0.2), Some(0.0));
        assert_eq!(hists.snrmax3.count("DEEP", GenType(10), 0.2), Some(0.0));

        let total: f64 = (0..hists.all.len())
            .filter(|&i| hists.all.gentype[i] == GenType(10))
            .map(|i| hists.all.n[i])
            .sum();
        assert_eq!(total, 1.0);
    }

    #[test]
    fn test_far_redshifts_fall_outside_bins() {
        assert_eq!(zbin_index(f64::INFINITY), None);
        assert_eq!(zbin_index(1e30), None);
        assert_eq!(zbin_index(f64::MAX), None);

        let rows = vec![
            row("DEEP", 10, f64::INFINITY, 10.0),
            row("DEEP", 10, 1e30, 10.0),
            row("DEEP", 10, 0.5, 10.0),
        ];
        let hists = ZHistogramBuilder::default().build(&rows, &gentypes(), &BTreeMap::new());
        let total: f64 = hists.all.n.iter().sum();
        assert_eq!(total, 1.0);
        assert_eq!(hists.all.count("DEEP", GenType(10), 0.5), Some(1.0));
    }

    #[test]
    fn test_read_dump_accepts_infinite_redshift() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("V.DUMP");
        std::fs::write(
            &path,
            "VARNAMES: CID FIELD GENTYPE ZCMB SNRMAX SNRMAX2 SNRMAX3\n\
             SN: 1 DEEP 10 inf 6.0 3.0 2.0\n",
        )
        .unwrap();
        let rows = read_dump(&path).unwrap();
        assert!(rows[0].zcmb.is_infinite());
        let hists = ZHistogramBuilder::default().build(&rows, &gentypes(), &BTreeMap::new());
        assert!(hists.all.n.iter().all(|n| *n == 0.0));
    }

    #[test]
    fn test_prescale_by_type_name() {
        let rows = vec![row("WIDE", 20, 1.05, 10.0), row("WIDE", 20, 1.01, 1.0)];
        let mut prescales = BTreeMap::new();
        prescales.insert("IIP+IIL".to_string(), 0.5);

        let hists = ZHistogramBuilder::new(5.0).build(&rows, &gentypes(), &prescales);
        assert_eq!(hists.all.count("WIDE", GenType(20), 1.0), Some(1.0));
        assert_eq!(hists.snrmax.count("WIDE", GenType(20), 1.0), Some(0.5));
        assert_eq!(hists.all.count("WIDE", GenType(10), 1.0), Some(0.0));
    }

    #[test]
    fn test_fields_in_first_seen_order() {
        let rows = vec![row("WIDE", 10, 0.5, 1.0), row("DEEP", 10, 0.5, 1.0)];
        let hists = ZHistogramBuilder::default().build(&rows, &gentypes(), &BTreeMap::new());
        assert_eq!(hists.all.tier[0], "WIDE");
        assert_eq!(hists.all.tier[2 * ZBIN_COUNT], "DEEP");
    }

    #[test]
    fn test_unknown_gentype_is_not_counted() {
        let rows = vec![row("DEEP", 99, 0.5, 10.0)];
        let hists = ZHistogramBuilder::default().build(&rows, &gentypes(), &BTreeMap::new());
        assert!(hists.all.n.iter().all(|n| *n == 0.0));
    }

    #[test]
    fn test_read_dump_table() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("V.DUMP");
        std::fs::write(
            &path,
            "# dump\nVARNAMES: CID FIELD GENTYPE ZCMB SNRMAX SNRMAX2 SNRMAX3\n\
             SN: 1 DEEP 10 0.25 6.0 3.0 2.0\n",
        )
        .unwrap();
        let rows = read_dump(&path).unwrap();
        assert_eq!(rows, vec![DumpRow {
            field: "DEEP".to_string(),
            gentype: GenType(10),
            zcmb: 0.25,
            snrmax: [6.0, 3.0, 2.0],
        }]);

        let err = read_dump(&dir.path().join("missing.DUMP")).unwrap_err();
        assert!(err.to_string().contains("Can't find"));
    }

    proptest! {
        #[test]
        fn prop_zhist_is_complete(
            rows in prop::collection::vec(
                (prop::sample::select(vec!["DEEP", "WIDE", "MED"]), prop::sample::select(vec![10i64, 20]), 0.0..3.5f64, 0.0..20.0f64),
                1..50,
            )
        ) {
            let rows: Vec<DumpRow> = rows.into_iter().map(|(f, g, z, s)| row(f, g, z, s)).collect();
            let mut fields: Vec<&str> = rows.iter().map(|r| r.field.as_str()).collect();
            fields.sort();
            fields.dedup();

            let map = gentypes();
            let hists = ZHistogramBuilder::default().build(&rows, &map, &BTreeMap::new());
            let expected = fields.len() * map.len() * ZBIN_COUNT;
            prop_assert_eq!(hists.all.len(), expected);
            prop_assert_eq!(hists.snrmax3.len(), expected);

            let in_range = rows.iter().filter(|r| r.zcmb < 3.1).count() as f64;
            let total: f64 = hists.all.n.iter().sum();
            prop_assert_eq!(total, in_range);
            for (all, gated) in hists.all.n.iter().zip(&hists.snrmax.n) {
                prop_assert!(gated <= all);
            }
        }
    }
}

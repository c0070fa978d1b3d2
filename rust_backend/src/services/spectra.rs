//! Spectral histograms from a variant's spectral extraction (`<VERSION>.SPEC`).
//!
//! Each tier lists one prism exposure time per spectroscopic strategy
//! (`texpose_prism`). For strategy `s` and tier `t`, the rows of `t` taken
//! at `t.texpose_prism[s]` are binned on redshift, time, magnitude and S/N
//! for every band, once with observed-frame time and once with rest-frame
//! time. Only occupied bins are kept.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::core::domain::{
    SparseBinKey, SparseCountTable, SpectralHistogramBundle, Tier, TierCandidateIds, TierSpectra,
    TimeFrame,
};
use crate::core::gentype::GenType;
use crate::parsing::doc_block::resolve_with_gz;
use crate::parsing::table::{parse_int_cell, unique_in_order, WhitespaceTable};

/// Bands with synthetic magnitudes in the extraction table.
pub const SPEC_BANDS: [&str; 4] = ["Z", "Y", "J", "H"];

/// Upper clamp of the derived S/N.
pub const SNR_CAP: f64 = 20.0;

/// Fixed binning of the spectral histograms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralBinning {
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
}

pub const BINNING: SpectralBinning = SpectralBinning {
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
};

fn bin(value: f64, min: f64, delta: f64) -> i64 {
    ((value - min) / delta).floor() as i64
}

impl SpectralBinning {
    pub fn zbin(&self, zhel: f64) -> i64 {
        bin(zhel, self.zmin, self.deltaz)
    }

    pub fn tbin(&self, tobs: f64) -> i64 {
        bin(tobs, self.tobsmin, self.deltat)
    }

    /// Time bin of the rest-frame phase `tobs / (1 + z)`.
    pub fn trestbin(&self, tobs: f64, zhel: f64) -> i64 {
        bin(tobs / (1.0 + zhel), self.tobsmin, self.deltat)
    }

    pub fn magbin(&self, mag: f64) -> i64 {
        bin(mag, self.mmin, self.deltam)
    }

    pub fn snrbin(&self, snr: f64) -> i64 {
        bin(snr, self.snrmin, self.deltasnr)
    }

    fn empty_bundle(&self, nspecstrategies: usize) -> SpectralHistogramBundle {
        SpectralHistogramBundle {
            zmin: self.zmin,
            zmax: self.zmax,
            deltaz: self.deltaz,
            tobsmin: self.tobsmin,
            tobsmax: self.tobsmax,
            deltat: self.deltat,
            mmin: self.mmin,
            mmax: self.mmax,
            deltam: self.deltam,
            snrmin: self.snrmin,
            snrmax: self.snrmax,
            deltasnr: self.deltasnr,
            nspecstrategies,
            spectrumhists: Vec::with_capacity(nspecstrategies),
        }
    }
}

/// S/N implied by a magnitude error: `2.5 / (err ln 10)`, 0 for
/// non-positive errors, capped at [`SNR_CAP`].
pub fn snr_from_magerr(magerr: f64) -> f64 {
    if magerr <= 0.0 {
        return 0.0;
    }
    let snr = 2.5 / (magerr * std::f64::consts::LN_10);
    snr.min(SNR_CAP)
}

/// One spectrum of the extraction table.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRow {
    pub cid: i64,
    pub field: String,
    pub texpose: f64,
    pub gentype: GenType,
    pub zhel: f64,
    pub tobs: f64,
    /// `(mag, magerr)` per entry of [`SPEC_BANDS`].
    pub mags: [(f64, f64); 4],
}

/// Extract the binned columns of a spectral table.
pub fn spec_rows(table: &WhitespaceTable) -> Result<Vec<SpecRow>> {
    let cids = table.column_with("CID", parse_int_cell)?;
    let fields = table.column_str("FIELD")?;
    let texpose = table.column::<f64>("TEXPOSE")?;
    let gentypes = table.column_with("GENTYPE", |c| c.parse::<GenType>().ok())?;
    let zhel = table.column::<f64>("zHEL")?;
    let tobs = table.column::<f64>("TOBS")?;

    let mut band_columns = Vec::with_capacity(SPEC_BANDS.len());
    for band in SPEC_BANDS {
        let mag = table.column::<f64>(&format!("{}_mag_syn", band))?;
        let err = table.column::<f64>(&format!("{}_magerr_syn", band))?;
        band_columns.push((mag, err));
    }

    Ok((0..table.len())
        .map(|i| {
            let mut mags = [(0.0, 0.0); 4];
            for (b, (mag, err)) in band_columns.iter().enumerate() {
                mags[b] = (mag[i], err[i]);
            }
            SpecRow {
                cid: cids[i],
                field: fields[i].to_string(),
                texpose: texpose[i],
                gentype: gentypes[i],
                zhel: zhel[i],
                tobs: tobs[i],
                mags,
            }
        })
        .collect())
}

/// Result of the spectral step for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSummary {
    pub bundle: SpectralHistogramBundle,
    pub candidate_ids: TierCandidateIds,
}

/// Number of spectroscopic strategies; every tier must list the same number.
pub fn strategy_count(tiers: &[Tier]) -> Result<usize> {
    let mut count: Option<(usize, &str)> = None;
    for tier in tiers {
        let n = tier.texpose_prism.len();
        match count {
            None => count = Some((n, tier.name.as_str())),
            Some((want, first)) if want != n => bail!(
                "Inconsistent numbers of texpose_prism: tier {} has {}, tier {} has {}",
                tier.name,
                n,
                first,
                want
            ),
            Some(_) => {}
        }
    }
    Ok(count.map(|(n, _)| n).unwrap_or(0))
}

/// Read the extraction table at `path` (or `path.gz`) and histogram it.
///
/// A missing table yields an empty bundle (binning and one empty map per
/// strategy) rather than an error.
pub fn build_from_file(path: &Path, tiers: &[Tier]) -> Result<SpectralSummary> {
    let Some(resolved) = resolve_with_gz(path) else {
        log::warn!(
            "Can't find {} (w/ or w/o .gz); no spectrum info for this variant",
            path.display()
        );
        let nstrat = strategy_count(tiers)?;
        let mut bundle = BINNING.empty_bundle(nstrat);
        bundle.spectrumhists.resize_with(nstrat, BTreeMap::new);
        return Ok(SpectralSummary {
            bundle,
            candidate_ids: TierCandidateIds::new(),
        });
    };
    log::debug!("Parsing {}", resolved.display());

    let table = WhitespaceTable::read(&resolved)?;
    let rows = spec_rows(&table).with_context(|| format!("Bad spectral table {}", resolved.display()))?;
    let (bundle, candidate_ids) = build_spectral_histograms(&rows, tiers)?;
    Ok(SpectralSummary {
        bundle,
        candidate_ids,
    })
}

/// Histogram spectral rows per strategy and tier.
///
/// Only tiers present in both `rows` and `tiers` are aggregated; a mismatch
/// between the two sets is logged.
pub fn build_spectral_histograms(
    rows: &[SpecRow],
    tiers: &[Tier],
) -> Result<(SpectralHistogramBundle, TierCandidateIds)> {
    let nstrat = strategy_count(tiers)?;

    let field_names: Vec<&str> = rows.iter().map(|r| r.field.as_str()).collect();
    let spec_fields = unique_in_order(&field_names);
    let spec_set: BTreeSet<&str> = spec_fields.iter().copied().collect();
    let phot_set: BTreeSet<&str> = tiers.iter().map(|t| t.name.as_str()).collect();
    if spec_set != phot_set {
        log::warn!(
            "Spectroscopic tiers {:?} don't match photometric {:?}",
            spec_set,
            phot_set
        );
    }

    let overlap: Vec<&Tier> = spec_fields
        .iter()
        .filter_map(|f| tiers.iter().find(|t| t.name == *f))
        .collect();

    let mut bundle = BINNING.empty_bundle(nstrat);
    let mut candidate_ids: TierCandidateIds = overlap
        .iter()
        .map(|t| (t.name.clone(), Vec::with_capacity(nstrat)))
        .collect();

    for strategy in 0..nstrat {
        let mut per_tier = BTreeMap::new();
        for tier in &overlap {
            let texpose = tier.texpose_prism[strategy];
            let selected: Vec<&SpecRow> = rows
                .iter()
                .filter(|r| r.field == tier.name && r.texpose == texpose as f64)
                .collect();
            log::debug!(
                "Spectrum strategy {}, tier {}: {} spectra",
                strategy,
                tier.name,
                selected.len()
            );

            per_tier.insert(tier.name.clone(), tier_spectra(&selected, texpose));

            let cids: BTreeSet<i64> = selected.iter().map(|r| r.cid).collect();
            candidate_ids
                .get_mut(&tier.name)
                .ok_or_else(|| anyhow!("Tier {} vanished from candidate table", tier.name))?
                .push(cids);
        }
        bundle.spectrumhists.push(per_tier);
    }

    Ok((bundle, candidate_ids))
}

fn tier_spectra(rows: &[&SpecRow], texpose: i64) -> TierSpectra {
    let mut spectra = TierSpectra {
        texpose,
        bands: BTreeMap::new(),
    };

    for (b, band) in SPEC_BANDS.iter().enumerate() {
        let mut observed: BTreeMap<SparseBinKey, u64> = BTreeMap::new();
        let mut rest: BTreeMap<SparseBinKey, u64> = BTreeMap::new();
        for row in rows {
            let (mag, magerr) = row.mags[b];
            let zbin = BINNING.zbin(row.zhel);
            let magbin = BINNING.magbin(mag);
            let snrbin = BINNING.snrbin(snr_from_magerr(magerr));
            let tbin = BINNING.tbin(row.tobs);
            let trestbin = BINNING.trestbin(row.tobs, row.zhel);

            *observed
                .entry((row.gentype, zbin, tbin, magbin, snrbin))
                .or_insert(0) += 1;
            *rest
                .entry((row.gentype, zbin, trestbin, magbin, snrbin))
                .or_insert(0) += 1;
        }
        spectra.bands.insert(
            band.to_string(),
            SparseCountTable::from_counts(TimeFrame::Observed, observed),
        );
        spectra.bands.insert(
            format!("{}_restframe", band),
            SparseCountTable::from_counts(TimeFrame::Rest, rest),
        );
    }
    spectra
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tier(name: &str, texpose: Vec<i64>) -> Tier {
        Tier {
            name: name.to_string(),
            ra: 0.0,
            dec: 0.0,
            bands: vec!['Z', 'Y', 'J', 'H'],
            relarea: vec![1],
            dt_visit: vec![5.0],
            z_snrmatch: vec![0.5],
            texpose_prism: texpose,
        }
    }

    fn spec(cid: i64, field: &str, texpose: f64, zhel: f64, tobs: f64) -> SpecRow {
        SpecRow {
            cid,
            field: field.to_string(),
            texpose,
            gentype: GenType(10),
            zhel,
            tobs,
            mags: [(22.5, 0.1); 4],
        }
    }

    #[test]
    fn test_bin_computation() {
        assert_eq!(BINNING.zbin(0.45), 2);
        assert_eq!(BINNING.tbin(-33.0), 0);
        assert_eq!(BINNING.tbin(-40.0), -1);
        assert_eq!(BINNING.trestbin(20.0, 1.0), 4);
        assert_eq!(BINNING.magbin(22.5), 2);
        assert_eq!(BINNING.snrbin(19.99), 19);
        assert_eq!(BINNING.snrbin(20.0), 20);
    }

    #[test]
    fn test_snr_clamping() {
        assert_eq!(snr_from_magerr(0.0), 0.0);
        assert_eq!(snr_from_magerr(-1.0), 0.0);
        assert_eq!(snr_from_magerr(0.001), SNR_CAP);
        let snr = snr_from_magerr(0.1);
        assert!((snr - 10.857362047581296).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_count_must_agree() {
        assert_eq!(strategy_count(&[tier("A", vec![1, 2]), tier("B", vec![3, 4])]).unwrap(), 2);
        let err = strategy_count(&[tier("A", vec![1, 2]), tier("B", vec![3])]).unwrap_err();
        assert!(err.to_string().contains("Inconsistent"));
        assert_eq!(strategy_count(&[]).unwrap(), 0);
    }

    #[test]
    fn test_histograms_per_strategy_and_tier() {
        let tiers = vec![tier("DEEP", vec![900, 1800]), tier("WIDE", vec![300, 600])];
        let rows = vec![
            spec(1, "DEEP", 900.0, 0.45, 0.0),
            spec(2, "DEEP", 900.0, 0.45, 1.0),
            spec(3, "DEEP", 1800.0, 0.45, 0.0),
            spec(4, "WIDE", 600.0, 0.1, 50.0),
            spec(5, "DEEP", 300.0, 0.45, 0.0),
        ];
        let (bundle, cids) = build_spectral_histograms(&rows, &tiers).unwrap();

        assert_eq!(bundle.nspecstrategies, 2);
        assert_eq!(bundle.spectrumhists.len(), 2);

        let deep0 = &bundle.spectrumhists[0]["DEEP"];
        assert_eq!(deep0.texpose, 900);
        let j = &deep0.bands["J"];
        assert_eq!(j.frame, TimeFrame::Observed);
        assert_eq!(j.total(), 2);
        assert_eq!(j.len(), 1);
        assert_eq!(j.zbin, vec![2]);
        assert_eq!(j.tbin, vec![3]);
        assert_eq!(deep0.bands["J_restframe"].frame, TimeFrame::Rest);
        assert_eq!(deep0.bands.len(), 2 * SPEC_BANDS.len());

        assert_eq!(bundle.spectrumhists[0]["WIDE"].bands["Z"].total(), 0);
        assert_eq!(bundle.spectrumhists[1]["WIDE"].bands["Z"].total(), 1);

        assert_eq!(cids["DEEP"][0], BTreeSet::from([1, 2]));
        assert_eq!(cids["DEEP"][1], BTreeSet::from([3]));
        assert!(cids["WIDE"][0].is_empty());
        assert_eq!(cids["WIDE"][1], BTreeSet::from([4]));
    }

    #[test]
    fn test_tier_mismatch_uses_overlap() {
        let tiers = vec![tier("DEEP", vec![900]), tier("WIDE", vec![300])];
        let rows = vec![spec(1, "DEEP", 900.0, 0.2, 0.0), spec(2, "EXTRA", 900.0, 0.2, 0.0)];
        let (bundle, cids) = build_spectral_histograms(&rows, &tiers).unwrap();
        assert!(bundle.spectrumhists[0].contains_key("DEEP"));
        assert!(!bundle.spectrumhists[0].contains_key("EXTRA"));
        assert!(!bundle.spectrumhists[0].contains_key("WIDE"));
        assert_eq!(cids.len(), 1);
    }

    #[test]
    fn test_missing_file_gives_empty_bundle() {
        let dir = tempfile::TempDir::new().unwrap();
        let tiers = [tier("DEEP", vec![900, 1800]), tier("WIDE", vec![300, 600])];
        let summary = build_from_file(&dir.path().join("V.SPEC"), &tiers).unwrap();
        assert_eq!(summary.bundle.nspecstrategies, 2);
        assert_eq!(summary.bundle.spectrumhists.len(), 2);
        assert!(summary.bundle.spectrumhists.iter().all(BTreeMap::is_empty));
        assert_eq!(summary.bundle.deltaz, BINNING.deltaz);
        assert!(summary.candidate_ids.is_empty());

        let json = serde_json::to_value(&summary.bundle).unwrap();
        assert_eq!(json["spectrumhists"], serde_json::json!([{}, {}]));
    }

    #[test]
    fn test_read_table_with_string_cids() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("V.SPEC");
        std::fs::write(
            &path,
            "CID FIELD TEXPOSE GENTYPE zHEL TOBS Z_mag_syn Z_magerr_syn Y_mag_syn Y_magerr_syn \
             J_mag_syn J_magerr_syn H_mag_syn H_magerr_syn\n\
             \"17\" DEEP 900 10 0.45 3.0 22 0.1 22 0.1 22 0.1 22 -9\n",
        )
        .unwrap();
        let summary = build_from_file(&path, &[tier("DEEP", vec![900])]).unwrap();
        assert_eq!(summary.candidate_ids["DEEP"][0], BTreeSet::from([17]));
        let bundle = summary.bundle;
        let h = &bundle.spectrumhists[0]["DEEP"].bands["H"];
        assert_eq!(h.snrbin, vec![0]);
    }

    #[test]
    fn test_texpose_mismatch_fails() {
        let tiers = vec![tier("DEEP", vec![900, 1800]), tier("WIDE", vec![300])];
        assert!(build_spectral_histograms(&[], &tiers).is_err());
    }

    proptest! {
        #[test]
        fn prop_snr_is_clamped(err in -1.0..10.0f64) {
            let snr = snr_from_magerr(err);
            if err <= 0.0 {
                prop_assert_eq!(snr, 0.0);
            } else {
                prop_assert!(snr > 0.0 && snr <= SNR_CAP);
                prop_assert_eq!(snr, (2.5 / (err * std::f64::consts::LN_10)).min(20.0));
            }
        }
    }
}

//! Tier exposure tables from the documentation header of a SIMLIB file.
//!
//! The header carries two parallel lists:
//!
//! ```text
//! TIER_INFO:            # name bands ntile nvisit area dt_visit NLIBID zSNRMATCH OpenFrac
//!   - DEEP/2 RZYJ 4 10 1.2 5.0 40 0.5 0.9
//! TIER_EXPOSURE_TIMES:  # name bands t_band1 t_band2 ...
//!   - DEEP/2 RZYJ 100 200 300 400
//! ```
//!
//! Entry `i` of both lists describes the same tier; name and band string must
//! agree between the two.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use super::doc_block::{read_doc_block, resolve_with_gz};
use crate::core::domain::{Tier, TierExposure, KNOWN_FILTERS};

const TIER_INFO_TOKENS: usize = 9;

#[derive(Debug, Deserialize)]
struct SimlibDoc {
    #[serde(rename = "TIER_INFO")]
    tier_info: Vec<String>,
    #[serde(rename = "TIER_EXPOSURE_TIMES")]
    tier_exposure_times: Vec<String>,
}

fn strip_tier_suffix(name: &str) -> &str {
    name.split('/').next().unwrap_or(name)
}

/// Read the tier snapshot documented in a SIMLIB file.
///
/// The literal path is tried first, then the `.gz` sibling. Tiers must all be
/// declared in `tiers`.
pub fn read_simlib_doc(simlib: &Path, tiers: &[Tier]) -> Result<BTreeMap<String, TierExposure>> {
    let path = resolve_with_gz(simlib).ok_or_else(|| anyhow!("Couldn't find {}", simlib.display()))?;
    log::debug!("Reading SIMLIB documentation from {}", path.display());

    let value = read_doc_block(&path)?;
    let doc: SimlibDoc = serde_path_to_error::deserialize(value)
        .with_context(|| format!("Invalid DOCUMENTATION block in {}", path.display()))?;

    parse_tier_tables(&doc.tier_info, &doc.tier_exposure_times, tiers)
        .with_context(|| format!("Bad tier tables in {}", path.display()))
}

/// Combine `TIER_INFO` and `TIER_EXPOSURE_TIMES` lines into per-tier records.
pub fn parse_tier_tables<S: AsRef<str>>(
    tier_info: &[S],
    exposure_times: &[S],
    tiers: &[Tier],
) -> Result<BTreeMap<String, TierExposure>> {
    if tier_info.len() != exposure_times.len() {
        bail!(
            "{} TIER_INFO lines but {} TIER_EXPOSURE_TIMES lines",
            tier_info.len(),
            exposure_times.len()
        );
    }

    let mut out = BTreeMap::new();
    for (info, exptimes) in tier_info.iter().zip(exposure_times) {
        let (name, exposure) = parse_tier_entry(info.as_ref(), exptimes.as_ref())?;
        if !tiers.iter().any(|t| t.name == name) {
            bail!("Tier {} is not declared in the campaign configuration", name);
        }
        out.insert(name, exposure);
    }
    Ok(out)
}

fn parse_tier_entry(info: &str, exptimes: &str) -> Result<(String, TierExposure)> {
    let tokens: Vec<&str> = info.split_whitespace().collect();
    if tokens.len() != TIER_INFO_TOKENS {
        bail!(
            "TIER_INFO line \"{}\" has {} fields, expected {}",
            info,
            tokens.len(),
            TIER_INFO_TOKENS
        );
    }
    let name = strip_tier_suffix(tokens[0]).to_string();
    let bands = tokens[1];

    let int = |i: usize, what: &str| -> Result<i64> {
        tokens[i]
            .parse()
            .with_context(|| format!("Bad {} \"{}\" for tier {}", what, tokens[i], name))
    };
    let float = |i: usize, what: &str| -> Result<f64> {
        tokens[i]
            .parse()
            .with_context(|| format!("Bad {} \"{}\" for tier {}", what, tokens[i], name))
    };

    let ex_tokens: Vec<&str> = exptimes.split_whitespace().collect();
    if ex_tokens.len() < 2 {
        bail!("TIER_EXPOSURE_TIMES line \"{}\" is too short", exptimes);
    }
    let ex_name = strip_tier_suffix(ex_tokens[0]);
    if ex_name != name {
        bail!(
            "Tier mismatch at exposure times; found {} where expected {}",
            ex_name,
            name
        );
    }
    if ex_tokens[1] != bands {
        bail!(
            "Tier exposure time mismatch for tier {}: found {} where expected {}",
            name,
            ex_tokens[1],
            bands
        );
    }
    if let Some(unknown) = bands.chars().find(|b| !KNOWN_FILTERS.contains(b)) {
        bail!("Unknown band {} in tier {}", unknown, name);
    }

    let band_list: Vec<char> = bands.chars().collect();
    if ex_tokens.len() != band_list.len() + 2 {
        bail!(
            "Tier {} lists {} exposure times for {} bands",
            name,
            ex_tokens.len() - 2,
            band_list.len()
        );
    }

    let mut exposure_by_band = BTreeMap::new();
    for filter in KNOWN_FILTERS {
        let exptime = match band_list.iter().position(|b| *b == filter) {
            Some(i) => ex_tokens[i + 2]
                .parse::<f64>()
                .with_context(|| format!("Bad exposure time \"{}\" for tier {}", ex_tokens[i + 2], name))?,
            None => 0.0,
        };
        exposure_by_band.insert(filter.to_string(), exptime);
    }

    let exposure = TierExposure {
        bands: exposure_by_band,
        ntile: int(2, "ntile")?,
        nvisit: int(3, "nvisit")?,
        area: float(4, "area")?,
        dt_visit: float(5, "dt_visit")?,
        nlibid: int(6, "NLIBID")?,
        z_snrmatch: float(7, "zSNRMATCH")?,
        open_frac: float(8, "OpenFrac")?,
    };
    Ok((name, exposure))
}

//! Line grammars for the free-text list fields of a campaign document.
//!
//! Several fields of the `INP*` document are YAML lists whose entries are
//! loosely formatted text lines:
//!
//! | field                         | line shape                                      |
//! |-------------------------------|-------------------------------------------------|
//! | `FORCE_SNRMAX`                | `5.0 [4200, 4800]`                              |
//! | `MJD_SEASON`                  | `61400 61800`                                   |
//! | `TIERS`                       | `DEEP/2 10.0 -44.0 RZYJ [1,2] [5] [0.5,0.8]`    |
//! | `TEXPOSE_PRISM`               | `DEEP [900, 1800]`                              |
//! | `BBC.MUOPT`                   | `/HIGHZ/ idsurvey_select=3`                     |
//! | `SIM.PRESCALE_TRANSIENT_LIST` | `IIL/0.5`                                       |
//!
//! Each grammar returns typed records or a [`SummaryError::Parse`] naming the
//! field and the offending line. A single bad line fails the whole field.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::core::domain::{ForceSnrMax, MjdSeason, MuOpt, Tier};
use crate::error::{SummaryError, SummaryResult};

/// Signed decimal with optional exponent.
const NUM: &str = r"[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?";

static FORCE_SNRMAX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?P<snr>{NUM})\s+\[\s*(?P<lam0>{NUM})\s*,\s*(?P<lam1>{NUM})\s*\]"
    ))
    .expect("FORCE_SNRMAX pattern compiles")
});

static MJD_SEASON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\s*(?P<mjd0>{NUM})\s+(?P<mjd1>{NUM})"))
        .expect("MJD_SEASON pattern compiles")
});

static TIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?P<tier>[^/\s]+)(?:/\d+)?\s+(?P<ra>{NUM})\s+(?P<dec>{NUM})\s+(?P<bands>\S+)\s+\[(?P<relarea>[^\]]+)\]\s*\[(?P<dt_visit>[^\]]+)\]\s*\[(?P<z_snrmatch>[^\]]+)\]"
    ))
    .expect("TIERS pattern compiles")
});

static TEXPOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<tier>\S+?)\s*\[(?P<texplist>[^\]]+)\]").expect("TEXPOSE_PRISM pattern compiles")
});

static MUOPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<name>.*)\s+idsurvey_select=(?P<id>[+-]?\d+)")
        .expect("MUOPT pattern compiles")
});

// Upstream sometimes writes a MUOPT line with no name at all.
static MUOPT_UNNAMED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*idsurvey_select=(?P<id>[+-]?\d+)").expect("MUOPT fallback pattern compiles")
});

static PRESCALE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^/]+)/(.*)$").expect("prescale pattern compiles"));

/// Name given to MUOPT lines that carry only `idsurvey_select=`.
pub const UNNAMED_MUOPT: &str = "(unnamed)";

fn parse_error(field: &'static str, line: &str) -> SummaryError {
    SummaryError::Parse {
        field,
        line: line.to_string(),
    }
}

fn capture<T: FromStr>(caps: &Captures, group: &str, field: &'static str, line: &str) -> SummaryResult<T> {
    caps.name(group)
        .and_then(|m| m.as_str().trim().parse().ok())
        .ok_or_else(|| parse_error(field, line))
}

/// Split a comma-separated list, as found between brackets.
fn parse_list<T: FromStr>(text: &str, field: &'static str, line: &str) -> SummaryResult<Vec<T>> {
    text.split(',')
        .map(|item| item.trim().parse().map_err(|_| parse_error(field, line)))
        .collect()
}

/// Parse `FORCE_SNRMAX` lines: `<snr> [<lam0>, <lam1>]`.
pub fn parse_force_snrmax<S: AsRef<str>>(lines: &[S]) -> SummaryResult<Vec<ForceSnrMax>> {
    const FIELD: &str = "FORCE_SNRMAX";
    lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            let caps = FORCE_SNRMAX_RE
                .captures(line)
                .ok_or_else(|| parse_error(FIELD, line))?;
            Ok(ForceSnrMax {
                snr: capture(&caps, "snr", FIELD, line)?,
                lam0: capture(&caps, "lam0", FIELD, line)?,
                lam1: capture(&caps, "lam1", FIELD, line)?,
            })
        })
        .collect()
}

/// Parse `MJD_SEASON` lines: `<mjd0> <mjd1>`.
pub fn parse_mjd_seasons<S: AsRef<str>>(lines: &[S]) -> SummaryResult<Vec<MjdSeason>> {
    const FIELD: &str = "MJD_SEASON";
    lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            let caps = MJD_SEASON_RE
                .captures(line)
                .ok_or_else(|| parse_error(FIELD, line))?;
            Ok(MjdSeason {
                season_mjd0: capture(&caps, "mjd0", FIELD, line)?,
                season_mjd1: capture(&caps, "mjd1", FIELD, line)?,
            })
        })
        .collect()
}

/// Parse `TEXPOSE_PRISM` lines: `<tier> [<int>, ...]`, keyed by tier name.
pub fn parse_texpose_prism<S: AsRef<str>>(lines: &[S]) -> SummaryResult<BTreeMap<String, Vec<i64>>> {
    const FIELD: &str = "TEXPOSE_PRISM";
    let mut out = BTreeMap::new();
    for line in lines {
        let line = line.as_ref();
        let caps = TEXPOSE_RE
            .captures(line)
            .ok_or_else(|| parse_error(FIELD, line))?;
        let texplist = parse_list(&caps["texplist"], FIELD, line)?;
        out.insert(caps["tier"].to_string(), texplist);
    }
    Ok(out)
}

/// Parse `TIERS` lines and merge in the `TEXPOSE_PRISM` lists by tier name.
///
/// Line shape: `<name>[/<n>] <ra> <dec> <bands> [<relarea,...>] [<dt_visit,...>] [<z_snrmatch,...>]`.
/// The optional `/<n>` suffix is dropped from the name.
pub fn parse_tiers<S: AsRef<str>>(
    lines: &[S],
    texpose_prism: &BTreeMap<String, Vec<i64>>,
) -> SummaryResult<Vec<Tier>> {
    const FIELD: &str = "TIERS";
    lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            let caps = TIER_RE.captures(line).ok_or_else(|| parse_error(FIELD, line))?;

            let bands: Vec<char> = caps["bands"].chars().collect();
            if !bands.iter().all(char::is_ascii_alphabetic) {
                return Err(parse_error(FIELD, line));
            }

            let name = caps["tier"].to_string();
            let texpose_prism = texpose_prism.get(&name).cloned().unwrap_or_default();
            Ok(Tier {
                ra: capture(&caps, "ra", FIELD, line)?,
                dec: capture(&caps, "dec", FIELD, line)?,
                bands,
                relarea: parse_list(&caps["relarea"], FIELD, line)?,
                dt_visit: parse_list(&caps["dt_visit"], FIELD, line)?,
                z_snrmatch: parse_list(&caps["z_snrmatch"], FIELD, line)?,
                texpose_prism,
                name,
            })
        })
        .collect()
}

/// Parse a single `BBC.MUOPT` line.
///
/// Lines with only `idsurvey_select=<n>` are accepted and named
/// [`UNNAMED_MUOPT`].
pub fn parse_muopt_line(line: &str) -> SummaryResult<MuOpt> {
    const FIELD: &str = "BBC.MUOPT";
    if let Some(caps) = MUOPT_RE.captures(line) {
        let name = caps["name"].trim();
        if !name.is_empty() {
            return Ok(MuOpt {
                name: name.to_string(),
                idsurvey_select: capture(&caps, "id", FIELD, line)?,
            });
        }
    }

    let caps = MUOPT_UNNAMED_RE
        .captures(line)
        .ok_or_else(|| parse_error(FIELD, line))?;
    Ok(MuOpt {
        name: UNNAMED_MUOPT.to_string(),
        idsurvey_select: capture(&caps, "id", FIELD, line)?,
    })
}

/// Build the mu-option list: `standard` first, then `base`, then one entry per line.
pub fn parse_muopt<S: AsRef<str>>(base: &[MuOpt], lines: &[S]) -> SummaryResult<Vec<MuOpt>> {
    let mut muopts = vec![MuOpt::standard()];
    muopts.extend(base.iter().filter(|m| **m != MuOpt::standard()).cloned());
    for line in lines {
        muopts.push(parse_muopt_line(line.as_ref())?);
    }
    Ok(muopts)
}

/// Parse `<type>/<factor>` prescale lines and apply [`apply_prescale_alias`].
pub fn parse_prescales<S: AsRef<str>>(lines: &[S]) -> SummaryResult<BTreeMap<String, f64>> {
    const FIELD: &str = "PRESCALE_TRANSIENT_LIST";
    let mut prescales = BTreeMap::new();
    for line in lines {
        let line = line.as_ref();
        let caps = PRESCALE_RE
            .captures(line)
            .ok_or_else(|| parse_error(FIELD, line))?;
        let factor: f64 = caps[2].trim().parse().map_err(|_| parse_error(FIELD, line))?;
        prescales.insert(caps[1].trim().to_string(), factor);
    }
    apply_prescale_alias(&mut prescales);
    Ok(prescales)
}

/// SNANA's README names the combined type `IIP+IIL` while the prescale list
/// only carries `IIL`; mirror the `IIL` factor under the combined name.
pub fn apply_prescale_alias(prescales: &mut BTreeMap<String, f64>) {
    match prescales.get("IIL").copied() {
        Some(iil) => {
            prescales.insert("IIP+IIL".to_string(), iil);
        }
        None => log::debug!("No IIL prescale listed; IIP+IIL alias not added"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_force_snrmax() {
        let parsed = parse_force_snrmax(&["5.0 [4200, 4800]", "  10 [9000,  12000.5]"]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].snr, 5.0);
        assert_eq!(parsed[0].lam0, 4200.0);
        assert_eq!(parsed[1].lam1, 12000.5);
    }

    #[test]
    fn test_force_snrmax_rejects_garbage() {
        let err = parse_force_snrmax(&["5.0 4200 4800"]).unwrap_err();
        match err {
            SummaryError::Parse { field, line } => {
                assert_eq!(field, "FORCE_SNRMAX");
                assert_eq!(line, "5.0 4200 4800");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_mjd_seasons() {
        let parsed = parse_mjd_seasons(&["61400.5 61800"]).unwrap();
        assert_eq!(parsed[0].season_mjd0, 61400.5);
        assert_eq!(parsed[0].season_mjd1, 61800.0);
        assert!(parse_mjd_seasons(&["61400"]).is_err());
    }

    #[test]
    fn test_tiers_with_suffix_and_texpose() {
        let mut texpose = BTreeMap::new();
        texpose.insert("DEEP".to_string(), vec![900, 1800]);

        let tiers = parse_tiers(
            &[
                "DEEP/2  10.0 -44.0 RZYJ [1, 2] [5.0] [0.5, 0.8]",
                "WIDE 12.5 +3.0 RZ [3,4] [10] [0.3,0.4]",
            ],
            &texpose,
        )
        .unwrap();

        assert_eq!(tiers[0].name, "DEEP");
        assert_eq!(tiers[0].bands, vec!['R', 'Z', 'Y', 'J']);
        assert_eq!(tiers[0].relarea, vec![1, 2]);
        assert_eq!(tiers[0].dt_visit, vec![5.0]);
        assert_eq!(tiers[0].z_snrmatch, vec![0.5, 0.8]);
        assert_eq!(tiers[0].texpose_prism, vec![900, 1800]);
        assert_eq!(tiers[1].dec, 3.0);
        assert!(tiers[1].texpose_prism.is_empty());
    }

    #[test]
    fn test_tiers_reject_bad_list() {
        assert!(parse_tiers(&["DEEP 10 -44 RZ [1,x] [5] [0.5]"], &BTreeMap::new()).is_err());
        assert!(parse_tiers(&["DEEP 10 -44 RZ [1] [5]"], &BTreeMap::new()).is_err());
        assert!(parse_tiers(&["DEEP 10 -44 R,Z [1] [5] [0.5]"], &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_texpose_prism() {
        let parsed = parse_texpose_prism(&["DEEP [900, 1800]", "WIDE[300]"]).unwrap();
        assert_eq!(parsed["DEEP"], vec![900, 1800]);
        assert_eq!(parsed["WIDE"], vec![300]);
        assert!(parse_texpose_prism(&["DEEP 900"]).is_err());
    }

    #[test]
    fn test_muopt_named_and_unnamed() {
        let muopts = parse_muopt(&[], &["/HIGHZ/ idsurvey_select=3", "idsurvey_select=7"]).unwrap();
        assert_eq!(muopts.len(), 3);
        assert_eq!(muopts[0], MuOpt::standard());
        assert_eq!(muopts[1].name, "/HIGHZ/");
        assert_eq!(muopts[1].idsurvey_select, 3);
        assert_eq!(muopts[2].name, UNNAMED_MUOPT);
        assert_eq!(muopts[2].idsurvey_select, 7);
    }

    #[test]
    fn test_muopt_always_starts_with_standard() {
        let muopts = parse_muopt::<&str>(&[MuOpt::standard()], &[]).unwrap();
        assert_eq!(muopts, vec![MuOpt::standard()]);
        assert!(parse_muopt_line("no selector here").is_err());
    }

    #[test]
    fn test_prescales_with_alias() {
        let prescales = parse_prescales(&["IIL/0.25", " Ia/1", "IIn/ 2.5"]).unwrap();
        assert_eq!(prescales["IIL"], 0.25);
        assert_eq!(prescales["IIP+IIL"], 0.25);
        assert_eq!(prescales["Ia"], 1.0);
        assert_eq!(prescales["IIn"], 2.5);
    }

    #[test]
    fn test_prescales_without_iil() {
        let prescales = parse_prescales(&["Ia/1"]).unwrap();
        assert!(!prescales.contains_key("IIP+IIL"));
        assert!(parse_prescales(&["Ia"]).is_err());
        assert!(parse_prescales(&["Ia/abc"]).is_err());
    }

    proptest! {
        #[test]
        fn prop_force_snrmax_roundtrips_tokens(
            snr in 0.0..1000.0f64,
            lam0 in 0.0..30000.0f64,
            lam1 in 0.0..30000.0f64,
        ) {
            let line = format!("{} [{}, {}]", snr, lam0, lam1);
            let parsed = parse_force_snrmax(&[line]).unwrap();
            prop_assert_eq!(parsed[0].snr, snr);
            prop_assert_eq!(parsed[0].lam0, lam0);
            prop_assert_eq!(parsed[0].lam1, lam1);
        }

        #[test]
        fn prop_tier_bands_one_char_per_filter(bands in "[RZYJHFK]{1,7}", n in 1usize..5) {
            let relarea: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
            let line = format!("T1 0.5 -1.5 {} [{}] [5] [0.5]", bands, relarea.join(","));
            let tiers = parse_tiers(&[line], &BTreeMap::new()).unwrap();
            prop_assert_eq!(tiers[0].bands.len(), bands.len());
            prop_assert_eq!(tiers[0].relarea.len(), n);
        }

        #[test]
        fn prop_prescale_alias_matches_iil(x in 0.0..100.0f64) {
            let prescales = parse_prescales(&[format!("IIL/{}", x)]).unwrap();
            prop_assert_eq!(prescales["IIP+IIL"], prescales["IIL"]);
        }
    }
}

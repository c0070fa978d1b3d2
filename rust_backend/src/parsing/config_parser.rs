//! Campaign configuration for one collection directory.
//!
//! A collection directory (`output_<NAME>/`) holds exactly one `INP*` YAML
//! document, the `ANALYSIS_INSTRUCTIONS.README` file map, and one `OUTPUT3*`
//! directory with the cosmology fit summary. The `INP*` document has three
//! parts this module reads:
//!
//! - `CONFIG_SURVEY`: survey block; `FORCE_SNRMAX`, `MJD_SEASON`, `TIERS` and
//!   the optional `TEXPOSE_PRISM` are lists of text lines.
//! - `CONFIG_INSTRUMENT_FILE`: path to an instrument YAML file, with `$VAR`
//!   environment references.
//! - `CONFIG_ANALYSIS_PREP`: analysis block; `BBC.MUOPT` and
//!   `SIM.PRESCALE_TRANSIENT_LIST` are lists of text lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};

use super::filemap::{FileMap, FILEMAP_NAME};
use super::line_grammar::{
    parse_force_snrmax, parse_mjd_seasons, parse_muopt, parse_prescales, parse_texpose_prism,
    parse_tiers,
};
use crate::core::domain::{AnalysisInfo, InstrInfo, SurveyInfo, Tier};
use crate::error::{SummaryError, SummaryResult};

pub const FIT_SUMMARY_NAME: &str = "BBC_SUMMARY_wfit0.FITRES";

static ENV_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))")
        .expect("env var pattern compiles")
});

/// Everything read once per collection before any variant is processed.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub surveyinfo: SurveyInfo,
    pub instrinfo: InstrInfo,
    pub analysisinfo: AnalysisInfo,
    pub tiers: Vec<Tier>,
    pub filemap: FileMap,
}

/// Lengths of the three variant axes shared by every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantAxes {
    pub n_area: usize,
    pub n_texpose: usize,
    pub n_zsnrmatch: usize,
}

impl VariantAxes {
    /// Number of variants in the cross product.
    pub fn len(&self) -> usize {
        self.n_area * self.n_texpose * self.n_zsnrmatch
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize)]
struct CampaignDoc {
    #[serde(rename = "CONFIG_SURVEY")]
    survey: Map<String, Value>,
    #[serde(rename = "CONFIG_INSTRUMENT_FILE")]
    instrument_file: String,
    #[serde(rename = "CONFIG_ANALYSIS_PREP")]
    analysis: Map<String, Value>,
}

/// Read the whole campaign configuration of a collection directory.
pub fn read_campaign(dir: &Path) -> SummaryResult<CampaignConfig> {
    let inp = find_single(dir, "INP", false)?;
    let filemap_path = dir.join(FILEMAP_NAME);
    if !filemap_path.is_file() {
        return Err(SummaryError::MissingFile(filemap_path));
    }

    log::debug!("Reading campaign document {}", inp.display());
    let text = std::fs::read_to_string(&inp).map_err(|e| SummaryError::io(&inp, e))?;
    let mut campaign = parse_campaign_str(&inp, &text, |name| std::env::var(name).ok())?;

    let instr_path = PathBuf::from(&campaign.instrument_file);
    let instr_path = if instr_path.is_relative() {
        dir.join(instr_path)
    } else {
        instr_path
    };
    campaign.config.instrinfo = read_yaml_as_json(&instr_path)?;
    campaign.config.filemap = FileMap::read(&filemap_path)?;

    Ok(campaign.config)
}

/// Campaign document with the instrument file still unread.
#[derive(Debug)]
pub struct ParsedCampaign {
    pub config: CampaignConfig,
    /// Instrument file path after environment expansion.
    pub instrument_file: String,
}

/// Parse an `INP*` document. `lookup` resolves environment variables.
pub fn parse_campaign_str<F>(origin: &Path, text: &str, lookup: F) -> SummaryResult<ParsedCampaign>
where
    F: Fn(&str) -> Option<String>,
{
    let yaml: YamlValue =
        serde_yaml::from_str(text).map_err(|e| SummaryError::yaml(origin.display().to_string(), e))?;
    let json = yaml_to_json(yaml);
    let doc: CampaignDoc = serde_path_to_error::deserialize(json)
        .map_err(|e| SummaryError::yaml(origin.display().to_string(), e))?;

    let surveyinfo = build_survey_info(&doc.survey)?;
    let tiers = build_tiers(&doc.survey)?;
    let analysisinfo = build_analysis_info(doc.analysis)?;
    let instrument_file = expand_env(&doc.instrument_file, lookup)?;

    Ok(ParsedCampaign {
        config: CampaignConfig {
            surveyinfo,
            instrinfo: Value::Null,
            analysisinfo,
            tiers,
            filemap: FileMap::default(),
        },
        instrument_file,
    })
}

fn string_lines(block: &Map<String, Value>, key: &str, context: &str) -> SummaryResult<Option<Vec<String>>> {
    let Some(value) = block.get(key) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| SummaryError::Config(format!("{}.{} is not a list", context, key)))?;
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(SummaryError::Config(format!(
                "{}.{} entry {} is not a text line",
                context, key, other
            ))),
        })
        .collect::<SummaryResult<Vec<_>>>()
        .map(Some)
}

fn required_lines(block: &Map<String, Value>, key: &str, context: &str) -> SummaryResult<Vec<String>> {
    string_lines(block, key, context)?
        .ok_or_else(|| SummaryError::Config(format!("{} has no {} list", context, key)))
}

fn build_survey_info(survey: &Map<String, Value>) -> SummaryResult<SurveyInfo> {
    const CONTEXT: &str = "CONFIG_SURVEY";
    let force_snrmax = parse_force_snrmax(&required_lines(survey, "FORCE_SNRMAX", CONTEXT)?)?;
    let mjd_season = parse_mjd_seasons(&required_lines(survey, "MJD_SEASON", CONTEXT)?)?;

    let mut extra = survey.clone();
    extra.remove("FORCE_SNRMAX");
    extra.remove("MJD_SEASON");

    Ok(SurveyInfo {
        force_snrmax,
        mjd_season,
        extra,
    })
}

fn build_tiers(survey: &Map<String, Value>) -> SummaryResult<Vec<Tier>> {
    const CONTEXT: &str = "CONFIG_SURVEY";
    let texpose = match string_lines(survey, "TEXPOSE_PRISM", CONTEXT)? {
        Some(lines) => parse_texpose_prism(&lines)?,
        None => Default::default(),
    };
    let tiers = parse_tiers(&required_lines(survey, "TIERS", CONTEXT)?, &texpose)?;

    for name in texpose.keys() {
        if !tiers.iter().any(|t| &t.name == name) {
            log::warn!("TEXPOSE_PRISM lists tier {} that is not in TIERS", name);
        }
    }
    Ok(tiers)
}

fn build_analysis_info(mut analysis: Map<String, Value>) -> SummaryResult<AnalysisInfo> {
    let muopt_lines = match analysis.get("BBC").and_then(Value::as_object) {
        Some(bbc) => string_lines(bbc, "MUOPT", "CONFIG_ANALYSIS_PREP.BBC")?.unwrap_or_default(),
        None => Vec::new(),
    };
    let muopt = parse_muopt(&[], &muopt_lines)?;

    let prescale_lines = match analysis.get("SIM").and_then(Value::as_object) {
        Some(sim) => string_lines(sim, "PRESCALE_TRANSIENT_LIST", "CONFIG_ANALYSIS_PREP.SIM")?,
        None => None,
    };
    let prescales = match prescale_lines {
        Some(lines) => parse_prescales(&lines)?,
        None => {
            log::debug!("No SIM.PRESCALE_TRANSIENT_LIST; all prescales are 1");
            Default::default()
        }
    };

    analysis.remove("muopt");
    analysis.remove("prescales");
    Ok(AnalysisInfo {
        muopt,
        prescales,
        extra: analysis,
    })
}

/// Expand `$VAR` and `${VAR}` references; an unset variable is an error.
pub fn expand_env<F>(input: &str, lookup: F) -> SummaryResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in ENV_VAR_RE.captures_iter(input) {
        let whole = caps.get(0).ok_or_else(|| SummaryError::Config(input.to_string()))?;
        let name = caps
            .name("braced")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let value = lookup(name).ok_or_else(|| {
            SummaryError::Config(format!(
                "environment variable {} referenced by \"{}\" is not set",
                name, input
            ))
        })?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Convert YAML into JSON, turning non-string mapping keys into strings.
pub fn yaml_to_json(value: YamlValue) -> Value {
    match value {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::Bool(b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        YamlValue::String(s) => Value::String(s),
        YamlValue::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        YamlValue::Mapping(mapping) => Value::Object(
            mapping
                .into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        YamlValue::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: YamlValue) -> String {
    match key {
        YamlValue::String(s) => s,
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn read_yaml_as_json(path: &Path) -> SummaryResult<Value> {
    if !path.is_file() {
        return Err(SummaryError::MissingFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| SummaryError::io(path, e))?;
    let yaml: YamlValue =
        serde_yaml::from_str(&text).map_err(|e| SummaryError::yaml(path.display().to_string(), e))?;
    Ok(yaml_to_json(yaml))
}

/// Find the single entry of `dir` whose name starts with `prefix`.
pub fn find_single(dir: &Path, prefix: &str, want_dir: bool) -> SummaryResult<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|e| SummaryError::io(dir, e))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SummaryError::io(dir, e))?;
        let path = entry.path();
        let matches_kind = if want_dir { path.is_dir() } else { path.is_file() };
        if matches_kind && entry.file_name().to_string_lossy().starts_with(prefix) {
            found.push(path);
        }
    }
    if found.len() != 1 {
        return Err(SummaryError::Consistency(format!(
            "There are {} {}* {} in {}, expected 1",
            found.len(),
            prefix,
            if want_dir { "directories" } else { "files" },
            dir.display()
        )));
    }
    Ok(found.remove(0))
}

/// Path of the collection's cosmology fit summary inside its `OUTPUT3*` directory.
pub fn locate_fit_summary(dir: &Path) -> SummaryResult<PathBuf> {
    let output3 = find_single(dir, "OUTPUT3", true)?;
    let path = output3.join(FIT_SUMMARY_NAME);
    if path.is_file() {
        Ok(path)
    } else {
        Err(SummaryError::MissingFile(path))
    }
}

/// Check that `relarea`, `dt_visit` and `z_snrmatch` have the same length
/// in every tier, and return those lengths.
pub fn validate_tier_axes(tiers: &[Tier]) -> SummaryResult<VariantAxes> {
    let first = tiers
        .first()
        .ok_or_else(|| SummaryError::Config("campaign declares no tiers".to_string()))?;
    let axes = VariantAxes {
        n_area: first.relarea.len(),
        n_texpose: first.dt_visit.len(),
        n_zsnrmatch: first.z_snrmatch.len(),
    };

    for tier in &tiers[1..] {
        let checks = [
            ("relarea", tier.relarea.len(), axes.n_area),
            ("dt_visit", tier.dt_visit.len(), axes.n_texpose),
            ("z_snrmatch", tier.z_snrmatch.len(), axes.n_zsnrmatch),
        ];
        for (var, got, want) in checks {
            if got != want {
                return Err(SummaryError::Consistency(format!(
                    "The number of {} is not the same for all tiers (tier {} has {}, tier {} has {})",
                    var, tier.name, got, first.name, want
                )));
            }
        }
    }
    Ok(axes)
}

/// The file map must hold exactly one row per point of the cross product.
pub fn validate_filemap(filemap: &FileMap, axes: VariantAxes) -> SummaryResult<()> {
    if filemap.len() != axes.len() {
        return Err(SummaryError::Consistency(format!(
            "file map has {} rows for a {}x{}x{} design space",
            filemap.len(),
            axes.n_area,
            axes.n_texpose,
            axes.n_zsnrmatch
        )));
    }
    Ok(())
}

/// Key a variant by `"<collection> <rest>"` when its identity is
/// `ROMAN_<collection>_DATA-<rest>`, else by the identity itself.
pub fn short_survey_name(collection: &str, version: &str) -> String {
    let prefix = format!("ROMAN_{}_DATA-", collection);
    match version.strip_prefix(&prefix) {
        Some(rest) => format!("{} {}", collection, rest),
        None => version.to_string(),
    }
}

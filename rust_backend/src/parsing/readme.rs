//! Generator-type names from a variant's `<VERSION>.README`.

use serde_yaml::Value as YamlValue;
use std::path::Path;

use super::doc_block::read_doc_block;
use crate::core::gentype::{GenType, GenTypeMap};
use crate::error::{SummaryError, SummaryResult};

const GENTYPE_KEY: &str = "GENTYPE_TO_NAME";

/// Read the `GENTYPE_TO_NAME` mapping of a README documentation block.
pub fn read_gentype_map(path: &Path) -> SummaryResult<GenTypeMap> {
    if !path.is_file() {
        return Err(SummaryError::MissingFile(path.to_path_buf()));
    }
    let doc = read_doc_block(path)?;
    gentype_map_from_doc(&doc).map_err(|message| SummaryError::yaml(path.display().to_string(), message))
}

/// Build a [`GenTypeMap`] from a parsed documentation block.
///
/// Keys may be YAML integers or strings; values are raw descriptions that
/// are reduced to canonical names.
pub fn gentype_map_from_doc(doc: &YamlValue) -> Result<GenTypeMap, String> {
    let mapping = doc
        .get(GENTYPE_KEY)
        .and_then(YamlValue::as_mapping)
        .ok_or_else(|| format!("no {} mapping", GENTYPE_KEY))?;

    let mut map = GenTypeMap::new();
    for (key, value) in mapping {
        let code = yaml_gentype(key)?;
        let description = value
            .as_str()
            .ok_or_else(|| format!("{} entry {} is not a string", GENTYPE_KEY, code))?;
        map.insert_description(code, description);
    }
    Ok(map)
}

fn yaml_gentype(key: &YamlValue) -> Result<GenType, String> {
    match key {
        YamlValue::Number(n) => n
            .as_i64()
            .map(GenType)
            .or_else(|| n.as_f64().and_then(|f| f.to_string().parse().ok()))
            .ok_or_else(|| format!("invalid GENTYPE key {}", n)),
        YamlValue::String(s) => s.parse(),
        other => Err(format!("invalid GENTYPE key {:?}", other)),
    }
}

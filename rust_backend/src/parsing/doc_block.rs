//! Plain/gzip text access and SNANA `DOCUMENTATION:` blocks.
//!
//! SNANA writes a YAML documentation header at the top of SIMLIB and README
//! files, closed by a literal `DOCUMENTATION_END:` line. Only that header is
//! read; the rest of the file is never touched.

use flate2::read::GzDecoder;
use serde_yaml::Value as YamlValue;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{SummaryError, SummaryResult};

pub const DOC_START: &str = "DOCUMENTATION:";
pub const DOC_END: &str = "DOCUMENTATION_END:";

/// Find `path`, or `path.gz` when the literal path does not exist.
pub fn resolve_with_gz(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let mut gz = path.as_os_str().to_owned();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    gz.is_file().then_some(gz)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Open a text file for line reading, decompressing `.gz` files.
pub fn open_text(path: &Path) -> SummaryResult<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|e| SummaryError::io(path, e))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read the lines of the documentation block, from the `DOCUMENTATION:` key
/// up to (not including) the `DOCUMENTATION_END:` terminator.
pub fn read_doc_lines(path: &Path) -> SummaryResult<Vec<String>> {
    let reader = open_text(path)?;
    let mut lines = Vec::new();
    let mut started = false;
    let mut terminated = false;

    for line in reader.lines() {
        let line = line.map_err(|e| SummaryError::io(path, e))?;
        if line.starts_with(DOC_END) {
            terminated = true;
            break;
        }
        if !started && line.trim_start().starts_with(DOC_START) {
            started = true;
        }
        if started {
            lines.push(line);
        }
    }

    if !started {
        return Err(SummaryError::yaml(
            path.display().to_string(),
            format!("no {} block", DOC_START),
        ));
    }
    if !terminated {
        return Err(SummaryError::yaml(
            path.display().to_string(),
            format!("{} block is not closed by {}", DOC_START, DOC_END),
        ));
    }
    Ok(lines)
}

/// Parse the documentation block of `path` and return the value under the
/// `DOCUMENTATION` key.
pub fn read_doc_block(path: &Path) -> SummaryResult<YamlValue> {
    let lines = read_doc_lines(path)?;
    let doc: YamlValue = serde_yaml::from_str(&lines.join("\n"))
        .map_err(|e| SummaryError::yaml(path.display().to_string(), e))?;

    match doc.get("DOCUMENTATION").cloned() {
        Some(YamlValue::Null) | None => Err(SummaryError::yaml(
            path.display().to_string(),
            "DOCUMENTATION block is empty",
        )),
        Some(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const DOC: &str = "\
DOCUMENTATION:
  PURPOSE: test
  TIER_INFO:
  - DEEP RZ 1 2 3.0 5.0 10 0.5 1.0
DOCUMENTATION_END:
BEGIN LIBGEN
garbage: [unterminated
";

    #[test]
    fn test_resolve_prefers_literal_then_gz() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("A.SIMLIB");
        assert!(resolve_with_gz(&plain).is_none());

        std::fs::write(dir.path().join("A.SIMLIB.gz"), b"").unwrap();
        assert_eq!(
            resolve_with_gz(&plain).unwrap(),
            dir.path().join("A.SIMLIB.gz")
        );

        std::fs::write(&plain, b"").unwrap();
        assert_eq!(resolve_with_gz(&plain).unwrap(), plain);
    }

    #[test]
    fn test_read_doc_block_stops_at_terminator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.SIMLIB");
        std::fs::write(&path, DOC).unwrap();

        let doc = read_doc_block(&path).unwrap();
        assert_eq!(doc["PURPOSE"].as_str(), Some("test"));
        assert_eq!(doc["TIER_INFO"].as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn test_read_doc_block_gzip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.SIMLIB.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(DOC.as_bytes()).unwrap();
        enc.finish().unwrap();

        let doc = read_doc_block(&path).unwrap();
        assert_eq!(doc["PURPOSE"].as_str(), Some("test"));
    }

    #[test]
    fn test_missing_terminator_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("A.README");
        std::fs::write(&path, "DOCUMENTATION:\n  PURPOSE: x\n").unwrap();
        assert!(matches!(
            read_doc_block(&path),
            Err(SummaryError::Yaml { .. })
        ));
    }
}

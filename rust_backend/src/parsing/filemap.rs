//! The per-collection file map (`ANALYSIS_INSTRUCTIONS.README`).
//!
//! Maps each `(i_AREA, i_TEXPOSE, i_zSNRMAX)` index triple of the design
//! space to the variant identity (`VERSION`) and its SIMLIB file.

use std::path::{Path, PathBuf};

use super::table::{parse_int_cell, WhitespaceTable};
use crate::error::{SummaryError, SummaryResult};

pub const FILEMAP_NAME: &str = "ANALYSIS_INSTRUCTIONS.README";

/// Index of one cell in the area × cadence × redshift-match cross product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantIndex {
    pub area: usize,
    pub texpose: usize,
    pub zsnrmatch: usize,
}

impl std::fmt::Display for VariantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.area, self.texpose, self.zsnrmatch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileMapEntry {
    pub index: VariantIndex,
    pub version: String,
    pub simlib_file: String,
}

#[derive(Debug, Clone, Default)]
pub struct FileMap {
    entries: Vec<FileMapEntry>,
}

impl FileMap {
    pub fn read(path: &Path) -> SummaryResult<Self> {
        let table = WhitespaceTable::read(path)?;
        Self::from_table(&table)
    }

    pub fn from_table(table: &WhitespaceTable) -> SummaryResult<Self> {
        table.require_columns(&["i_AREA", "i_TEXPOSE", "i_zSNRMAX", "VERSION", "SIMLIB_FILE"])?;

        let as_index = |cell: &str| parse_int_cell(cell).and_then(|v| usize::try_from(v).ok());
        let areas = table.column_with("i_AREA", as_index)?;
        let texposes = table.column_with("i_TEXPOSE", as_index)?;
        let zsnrmatches = table.column_with("i_zSNRMAX", as_index)?;
        let versions = table.column_str("VERSION")?;
        let simlibs = table.column_str("SIMLIB_FILE")?;

        let entries = (0..table.len())
            .map(|i| FileMapEntry {
                index: VariantIndex {
                    area: areas[i],
                    texpose: texposes[i],
                    zsnrmatch: zsnrmatches[i],
                },
                version: versions[i].to_string(),
                simlib_file: simlibs[i].to_string(),
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<FileMapEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FileMapEntry] {
        &self.entries
    }

    /// The single entry for `index`; zero or several matches is fatal.
    pub fn lookup(&self, index: VariantIndex) -> SummaryResult<&FileMapEntry> {
        let mut matches = self.entries.iter().filter(|e| e.index == index);
        match (matches.next(), matches.next()) {
            (Some(entry), None) => Ok(entry),
            (None, _) => Err(SummaryError::Consistency(format!(
                "file map has no row for index {}",
                index
            ))),
            (Some(_), Some(_)) => Err(SummaryError::Consistency(format!(
                "file map has {} rows for index {}",
                self.entries.iter().filter(|e| e.index == index).count(),
                index
            ))),
        }
    }

    /// The SIMLIB path of an entry, relative to the collection directory.
    pub fn simlib_path(&self, entry: &FileMapEntry, collection_dir: &Path) -> PathBuf {
        collection_dir.join(&entry.simlib_file)
    }
}

//! Whitespace-delimited table reader.
//!
//! SNANA dump, spectral and fit-summary files are all whitespace-separated
//! tables: the first non-blank, non-comment line is the header, `#` starts a
//! comment, and every data row must have exactly as many tokens as the
//! header. A header like `VARNAMES: CID FIELD ...` is taken verbatim, so the
//! `VARNAMES:` token simply becomes a column (and `SN:` its value).

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::doc_block::open_text;
use crate::error::{SummaryError, SummaryResult};

/// An in-memory whitespace table with string cells.
#[derive(Debug, Clone)]
pub struct WhitespaceTable {
    path: PathBuf,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl WhitespaceTable {
    /// Read a table from disk; `.gz` files are decompressed.
    pub fn read(path: &Path) -> SummaryResult<Self> {
        let reader = open_text(path)?;
        Self::from_reader(path, reader)
    }

    /// Parse a table from an in-memory string; `origin` is used in errors.
    pub fn parse_str(origin: &Path, text: &str) -> SummaryResult<Self> {
        Self::from_reader(origin, text.as_bytes())
    }

    fn from_reader<R: BufRead>(path: &Path, reader: R) -> SummaryResult<Self> {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SummaryError::io(path, e))?;
            let content = match line.find('#') {
                Some(pos) => &line[..pos],
                None => line.as_str(),
            };
            let tokens: Vec<String> = content.split_whitespace().map(str::to_string).collect();
            if tokens.is_empty() {
                continue;
            }

            match &columns {
                None => columns = Some(tokens),
                Some(header) => {
                    if tokens.len() != header.len() {
                        return Err(SummaryError::table(
                            path,
                            format!(
                                "line {} has {} fields, header has {}",
                                lineno + 1,
                                tokens.len(),
                                header.len()
                            ),
                        ));
                    }
                    rows.push(tokens);
                }
            }
        }

        let columns = columns.ok_or_else(|| SummaryError::table(path, "no header line"))?;
        let mut index = HashMap::new();
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(SummaryError::table(path, format!("duplicate column {}", name)));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            index,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Fail unless every named column is present.
    pub fn require_columns(&self, names: &[&str]) -> SummaryResult<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !self.has_column(n))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SummaryError::table(
                &self.path,
                format!("missing column(s) {}", missing.join(", ")),
            ))
        }
    }

    fn column_index(&self, name: &str) -> SummaryResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| SummaryError::table(&self.path, format!("missing column {}", name)))
    }

    /// Raw string cells of one column.
    pub fn column_str(&self, name: &str) -> SummaryResult<Vec<&str>> {
        let i = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[i].as_str()).collect())
    }

    /// Parse every cell of one column.
    pub fn column<T: FromStr>(&self, name: &str) -> SummaryResult<Vec<T>> {
        let i = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                row[i].parse().map_err(|_| {
                    SummaryError::table(
                        &self.path,
                        format!("bad value {:?} in column {} (row {})", row[i], name, r + 1),
                    )
                })
            })
            .collect()
    }

    /// Parse one column with a custom cell parser.
    pub fn column_with<T, F>(&self, name: &str, parse: F) -> SummaryResult<Vec<T>>
    where
        F: Fn(&str) -> Option<T>,
    {
        let i = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                parse(&row[i]).ok_or_else(|| {
                    SummaryError::table(
                        &self.path,
                        format!("bad value {:?} in column {} (row {})", row[i], name, r + 1),
                    )
                })
            })
            .collect()
    }

    /// Iterate rows as `(column, cell)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = Vec<(&str, &str)>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }
}

/// Distinct values in first-seen order.
pub fn unique_in_order<T: PartialEq + Clone>(values: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for v in values {
        if !out.contains(v) {
            out.push(v.clone());
        }
    }
    out
}

/// Parse an integer cell that may be written as a float or quoted string.
pub fn parse_int_cell(cell: &str) -> Option<i64> {
    let cell = cell.trim().trim_matches(|c| c == '"' || c == '\'');
    if let Ok(v) = cell.parse::<i64>() {
        return Some(v);
    }
    cell.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.fract() == 0.0)
        .map(|v| v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> SummaryResult<WhitespaceTable> {
        WhitespaceTable::parse_str(Path::new("test.DUMP"), text)
    }

    #[test]
    fn test_header_comments_and_blanks() {
        let t = table(
            "# produced by snana\n\
             \n\
             VARNAMES: CID FIELD ZCMB\n\
             SN: 1 DEEP 0.25  # trailing comment\n\
             SN: 2 WIDE 1.5\n",
        )
        .unwrap();
        assert_eq!(t.columns(), ["VARNAMES:", "CID", "FIELD", "ZCMB"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column_str("FIELD").unwrap(), vec!["DEEP", "WIDE"]);
        assert_eq!(t.column::<f64>("ZCMB").unwrap(), vec![0.25, 1.5]);
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let err = table("A B\n1 2\n3\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_missing_column() {
        let t = table("A B\n1 2\n").unwrap();
        assert!(t.column_str("C").is_err());
        assert!(t.require_columns(&["A", "C"]).is_err());
        assert!(t.require_columns(&["A", "B"]).is_ok());
    }

    #[test]
    fn test_bad_numeric_cell() {
        let t = table("A\nx\n").unwrap();
        let err = t.column::<f64>("A").unwrap_err();
        assert!(err.to_string().contains("column A"));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        assert!(table("# only a comment\n").is_err());
    }

    #[test]
    fn test_parse_int_cell() {
        assert_eq!(parse_int_cell("42"), Some(42));
        assert_eq!(parse_int_cell("\"42\""), Some(42));
        assert_eq!(parse_int_cell("42.0"), Some(42));
        assert_eq!(parse_int_cell("42.5"), None);
        assert_eq!(parse_int_cell("abc"), None);
    }

    #[test]
    fn test_unique_in_order() {
        assert_eq!(
            unique_in_order(&["WIDE", "DEEP", "WIDE"]),
            vec!["WIDE", "DEEP"]
        );
    }

    #[test]
    fn test_rows_pairs_columns() {
        let t = table("A B\n1 2\n").unwrap();
        let rows: Vec<_> = t.rows().collect();
        assert_eq!(rows[0], vec![("A", "1"), ("B", "2")]);
    }
}

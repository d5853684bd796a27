//! File ingestion
//!
//! Turns uploaded bytes into an immutable [`RawTable`]. Supported formats:
//!
//! - **CSV / TSV**: every cell is text
//! - **XLSX**: first worksheet; numbers, strings, booleans and date-formatted
//!   cells keep their native type
//! - **JSON / JSONL**: arrays of objects (or arrays of arrays); values keep
//!   their JSON type
//!
//! The header is the first non-empty row unless the caller passes an explicit
//! header row. Blank rows and trailing empty columns are dropped.

mod delimited;
mod error;
mod json;
mod xlsx;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CellValue, RawTable};

pub use error::{IngestError, IngestResult};

/// Default upload ceiling (10 MB)
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Declared format of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Tsv,
    Xlsx,
    Json,
    Jsonl,
}

impl FileKind {
    /// Map a file extension (without the dot) to a kind
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "tsv" | "tab" => Some(FileKind::Tsv),
            "xlsx" | "xlsm" => Some(FileKind::Xlsx),
            "json" => Some(FileKind::Json),
            "jsonl" | "ndjson" => Some(FileKind::Jsonl),
            _ => None,
        }
    }

    /// Kind of an uploaded file from its name
    pub fn from_file_name(file_name: &str) -> IngestResult<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::from_extension(ext).ok_or_else(|| {
            IngestError::UnsupportedKind(if ext.is_empty() {
                file_name.to_string()
            } else {
                ext.to_string()
            })
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Tsv => "tsv",
            FileKind::Xlsx => "xlsx",
            FileKind::Json => "json",
            FileKind::Jsonl => "jsonl",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FileKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| IngestError::UnsupportedKind(s.to_string()))
    }
}

/// Parses uploads into raw tables
#[derive(Debug, Clone)]
pub struct FileIngestor {
    max_bytes: usize,
    header_row: Option<usize>,
}

impl Default for FileIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIngestor {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            header_row: None,
        }
    }

    /// Set the upload size ceiling
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Use a fixed zero-based header row instead of the first non-empty row
    pub fn with_header_row(mut self, header_row: Option<usize>) -> Self {
        self.header_row = header_row;
        self
    }

    /// Parse `bytes` as `kind`
    pub fn ingest(&self, bytes: &[u8], kind: FileKind) -> IngestResult<RawTable> {
        if bytes.len() > self.max_bytes {
            return Err(IngestError::FileTooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(IngestError::EmptyFile);
        }

        let grid = match kind {
            FileKind::Csv => delimited::read_grid(bytes, b',', kind)?,
            FileKind::Tsv => delimited::read_grid(bytes, b'\t', kind)?,
            FileKind::Xlsx => xlsx::read_grid(bytes)?,
            FileKind::Json => json::read_json_grid(bytes)?,
            FileKind::Jsonl => json::read_jsonl_grid(bytes)?,
        };

        let table = grid_to_table(grid, self.header_row)?;
        debug!(
            kind = %kind,
            bytes = bytes.len(),
            columns = table.column_count(),
            rows = table.row_count(),
            "Ingested upload"
        );
        Ok(table)
    }

    /// Read and parse a file from disk, inferring the kind from its extension
    pub fn ingest_path(&self, path: impl AsRef<Path>) -> IngestResult<RawTable> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let kind = FileKind::from_file_name(name)?;
        let bytes = std::fs::read(path).map_err(|e| IngestError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.ingest(&bytes, kind)
    }
}

fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}

/// Pick the header, drop blank rows and trailing empty columns
fn grid_to_table(grid: Vec<Vec<CellValue>>, header_row: Option<usize>) -> IngestResult<RawTable> {
    let header_idx = match header_row {
        Some(idx) if idx < grid.len() && !is_blank_row(&grid[idx]) => idx,
        Some(_) => return Err(IngestError::EmptyFile),
        None => grid
            .iter()
            .position(|row| !is_blank_row(row))
            .ok_or(IngestError::EmptyFile)?,
    };

    let mut rows = grid;
    let data: Vec<Vec<CellValue>> = rows
        .split_off(header_idx + 1)
        .into_iter()
        .filter(|row| !is_blank_row(row))
        .collect();
    let header = rows.pop().unwrap_or_default();

    if data.is_empty() {
        return Err(IngestError::EmptyFile);
    }

    let width = std::iter::once(&header)
        .chain(data.iter())
        .map(|row| {
            row.iter()
                .rposition(|cell| !cell.is_blank())
                .map(|p| p + 1)
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0);

    let columns = (0..width)
        .map(|idx| {
            header
                .get(idx)
                .map(|cell| cell.to_string().trim().to_string())
                .unwrap_or_default()
        })
        .collect();

    Ok(RawTable::new(columns, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_file_kind_from_file_name() {
        assert_eq!(FileKind::from_file_name("assets.CSV").unwrap(), FileKind::Csv);
        assert_eq!(FileKind::from_file_name("a.b.xlsx").unwrap(), FileKind::Xlsx);
        assert_eq!(FileKind::from_file_name("rows.ndjson").unwrap(), FileKind::Jsonl);
        assert!(matches!(
            FileKind::from_file_name("legacy.xls"),
            Err(IngestError::UnsupportedKind(_))
        ));
        assert!(FileKind::from_file_name("README").is_err());
    }

    #[test]
    fn test_file_kind_parse_and_display() {
        let kind: FileKind = "tsv".parse().unwrap();
        assert_eq!(kind, FileKind::Tsv);
        assert_eq!(kind.to_string(), "tsv");
    }

    #[test]
    fn test_grid_skips_leading_blank_rows_and_trailing_columns() {
        let grid = vec![
            vec![CellValue::Blank, CellValue::Blank],
            vec![text("name"), text("qty"), CellValue::Blank],
            vec![text("Laptop"), text("2"), CellValue::Blank],
            vec![CellValue::Blank, CellValue::Blank, CellValue::Blank],
            vec![text("Mouse"), text("5")],
            vec![CellValue::Blank],
        ];
        let table = grid_to_table(grid, None).unwrap();
        assert_eq!(table.columns(), &["name".to_string(), "qty".to_string()]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(1, 0), &text("Mouse"));
    }

    #[test]
    fn test_grid_explicit_header_row() {
        let grid = vec![
            vec![text("Inventory export")],
            vec![text("name"), text("qty")],
            vec![text("Laptop"), text("2")],
        ];
        let table = grid_to_table(grid, Some(1)).unwrap();
        assert_eq!(table.columns()[1], "qty");
        assert_eq!(table.row_count(), 1);
    }

    #[test]
    fn test_grid_header_only_is_empty() {
        let grid = vec![vec![text("name"), text("qty")]];
        assert!(matches!(grid_to_table(grid, None), Err(IngestError::EmptyFile)));
    }

    #[test]
    fn test_ingest_rejects_oversized_upload() {
        let ingestor = FileIngestor::new().with_max_bytes(4);
        let err = ingestor.ingest(b"a,b\n1,2\n", FileKind::Csv).unwrap_err();
        assert!(matches!(err, IngestError::FileTooLarge { size: 8, limit: 4 }));
    }

    #[test]
    fn test_ingest_whitespace_only_is_empty() {
        let err = FileIngestor::new().ingest(b" \n\n ", FileKind::Csv).unwrap_err();
        assert!(matches!(err, IngestError::EmptyFile));
    }
}

//! CSV and TSV reading

use super::FileKind;
use super::error::{IngestError, IngestResult};
use crate::models::CellValue;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read delimited text into a grid of text cells
///
/// Rows may have differing lengths. Invalid UTF-8 is decoded lossily, but
/// content with NUL bytes is treated as binary and rejected.
pub(super) fn read_grid(
    bytes: &[u8],
    delimiter: u8,
    kind: FileKind,
) -> IngestResult<Vec<Vec<CellValue>>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.contains(&0) {
        return Err(IngestError::unreadable(kind, "file contains binary data"));
    }

    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for (line, record) in reader.byte_records().enumerate() {
        let record = record
            .map_err(|e| IngestError::unreadable(kind, format!("record {}: {}", line + 1, e)))?;
        grid.push(
            record
                .iter()
                .map(|field| CellValue::text(String::from_utf8_lossy(field).into_owned()))
                .collect(),
        );
    }
    Ok(grid)
}

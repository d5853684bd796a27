//! JSON and JSON Lines reading

use serde_json::Value as JsonValue;

use super::FileKind;
use super::error::{IngestError, IngestResult};
use crate::models::CellValue;

/// Read a JSON document into a grid whose first row is the header
///
/// Accepts an array of objects, an array of arrays (first array is the
/// header), or an object wrapping one of those under `data`, `rows` or
/// `records`.
pub(super) fn read_json_grid(bytes: &[u8]) -> IngestResult<Vec<Vec<CellValue>>> {
    let kind = FileKind::Json;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let value: JsonValue = serde_json::from_slice(bytes)
        .map_err(|e| IngestError::unreadable(kind, e.to_string()))?;

    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => ["data", "rows", "records"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(JsonValue::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| {
                IngestError::unreadable(kind, "expected an array of records at the top level")
            })?,
        _ => {
            return Err(IngestError::unreadable(
                kind,
                "expected an array of records at the top level",
            ));
        }
    };

    if items.iter().all(JsonValue::is_array) && !items.is_empty() {
        return Ok(items
            .into_iter()
            .map(|row| match row {
                JsonValue::Array(cells) => cells.into_iter().map(json_to_cell).collect(),
                _ => Vec::new(),
            })
            .collect());
    }

    records_to_grid(items, kind)
}

/// Read newline-delimited JSON objects, skipping empty lines
pub(super) fn read_jsonl_grid(bytes: &[u8]) -> IngestResult<Vec<Vec<CellValue>>> {
    let kind = FileKind::Jsonl;
    let text = std::str::from_utf8(bytes)
        .map_err(|e| IngestError::unreadable(kind, format!("not valid UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: JsonValue = serde_json::from_str(line).map_err(|e| {
            IngestError::unreadable(kind, format!("line {}: {}", line_num + 1, e))
        })?;
        records.push(value);
    }

    records_to_grid(records, kind)
}

/// Objects become rows; the header is the union of keys in first-seen order
fn records_to_grid(records: Vec<JsonValue>, kind: FileKind) -> IngestResult<Vec<Vec<CellValue>>> {
    let mut header: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());

    for (idx, record) in records.into_iter().enumerate() {
        match record {
            JsonValue::Object(map) => {
                for key in map.keys() {
                    if !header.iter().any(|h| h == key) {
                        header.push(key.clone());
                    }
                }
                objects.push(map);
            }
            other => {
                return Err(IngestError::unreadable(
                    kind,
                    format!("record {} is {}, expected an object", idx + 1, json_type(&other)),
                ));
            }
        }
    }

    let mut grid = Vec::with_capacity(objects.len() + 1);
    grid.push(header.iter().map(|h| CellValue::text(h.clone())).collect());
    for mut object in objects {
        grid.push(
            header
                .iter()
                .map(|key| object.remove(key).map(json_to_cell).unwrap_or_default())
                .collect(),
        );
    }
    Ok(grid)
}

fn json_to_cell(value: JsonValue) -> CellValue {
    match value {
        JsonValue::Null => CellValue::Blank,
        JsonValue::Bool(b) => CellValue::Bool(b),
        JsonValue::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
        JsonValue::String(s) => CellValue::text(s),
        nested => CellValue::Text(nested.to_string()),
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

//! Tabular data models
//!
//! `RawTable` is what the ingestor produces and is never modified afterwards.
//! `NormalizedTable` is the cleaned, typed, deduplicated form the analysis and
//! reporting stages consume.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::cell::{CellValue, format_number};

static BLANK_CELL: CellValue = CellValue::Blank;

/// Header names plus ordered rows of cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Create a table, padding short rows with blanks and truncating long ones
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Blank);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Cell at `(row, column)`, or `Blank` when out of range
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&BLANK_CELL)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A typed, normalized value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of integer and number values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// One normalized row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// Index of the first source row this row came from
    pub source_index: usize,
    /// Values aligned with `NormalizedTable::columns`
    pub values: Vec<Value>,
    /// Number of source rows merged into this one (1 when unique)
    pub merge_count: u32,
}

/// Cleaned and deduplicated table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTable {
    pub report_type: String,
    pub columns: Vec<String>,
    pub rows: Vec<NormalizedRow>,
    /// Currency every money column was converted to
    pub base_currency: String,
    /// Version of the exchange-rate table used for conversion
    pub rates_version: String,
}

impl NormalizedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value of `column` in `row`, `Null` when the column is unknown
    pub fn value<'a>(&'a self, row: &'a NormalizedRow, column: &str) -> &'a Value {
        static NULL: Value = Value::Null;
        self.column_index(column)
            .and_then(|idx| row.values.get(idx))
            .unwrap_or(&NULL)
    }

    /// All values of one column in row order
    pub fn column_values(&self, column: &str) -> Vec<&Value> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().filter_map(|r| r.values.get(idx)).collect(),
            None => Vec::new(),
        }
    }

    /// Summary statistics over the whole table
    pub fn stats(&self) -> TableStats {
        let mut numeric_totals = BTreeMap::new();
        let mut distinct_values = BTreeMap::new();

        for (idx, column) in self.columns.iter().enumerate() {
            let values: Vec<&Value> = self.rows.iter().filter_map(|r| r.values.get(idx)).collect();
            if values.iter().any(|v| v.as_f64().is_some()) {
                let total: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
                numeric_totals.insert(column.clone(), round2(total));
            } else if values.iter().any(|v| matches!(v, Value::Text(_))) {
                let distinct: BTreeSet<String> = values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_string())
                    .collect();
                distinct_values.insert(column.clone(), distinct.len());
            }
        }

        TableStats {
            row_count: self.rows.len(),
            merged_rows: self
                .rows
                .iter()
                .map(|r| r.merge_count.saturating_sub(1) as usize)
                .sum(),
            numeric_totals,
            distinct_values,
        }
    }
}

/// Aggregate facts about a normalized table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: usize,
    /// Source rows folded into another row by deduplication
    pub merged_rows: usize,
    /// Sum of every numeric column
    pub numeric_totals: BTreeMap<String, f64>,
    /// Number of distinct values in every text column
    pub distinct_values: BTreeMap<String, usize>,
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

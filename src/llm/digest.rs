//! Payload selection for analysis requests
//!
//! Small tables are sent row by row. Tables above the row or byte ceiling are
//! replaced by a [`TableDigest`]: a deterministic sample of rows plus
//! aggregate statistics for every column.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{NormalizedTable, Value, round2};

/// How digest rows are picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    /// Evenly spaced rows across the whole table
    #[default]
    Stride,
    /// The first rows of the table
    Head,
}

/// When and how to digest a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestConfig {
    /// Tables with more rows are digested
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Tables whose serialized rows exceed this size are digested
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Rows included in a digest
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    #[serde(default)]
    pub method: SampleMethod,
}

fn default_max_rows() -> usize {
    200
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

fn default_sample_size() -> usize {
    25
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_payload_bytes: default_max_payload_bytes(),
            sample_size: default_sample_size(),
            method: SampleMethod::default(),
        }
    }
}

impl DigestConfig {
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn with_sample(mut self, sample_size: usize, method: SampleMethod) -> Self {
        self.sample_size = sample_size;
        self.method = method;
        self
    }
}

/// Data sent to the analysis service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisPayload {
    /// Every normalized row
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Sample plus statistics
    Digest(TableDigest),
}

impl AnalysisPayload {
    pub fn is_digest(&self) -> bool {
        matches!(self, AnalysisPayload::Digest(_))
    }
}

/// Compact description of a table too large to send whole
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDigest {
    pub total_rows: usize,
    pub merged_rows: usize,
    pub columns: Vec<String>,
    pub method: SampleMethod,
    /// Positions of the sampled rows in the normalized table
    pub sample_positions: Vec<usize>,
    pub sample_rows: Vec<Vec<serde_json::Value>>,
    pub column_stats: Vec<ColumnSummary>,
}

/// Aggregates for one column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub non_null: usize,
    pub distinct: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Most frequent text values, most common first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

const TOP_VALUES: usize = 5;

/// Choose the payload for `table`; the flag is true when it was digested
pub fn build_payload(table: &NormalizedTable, config: &DigestConfig) -> (AnalysisPayload, bool) {
    let rows: Vec<Vec<serde_json::Value>> = table
        .rows
        .iter()
        .map(|r| r.values.iter().map(value_to_json).collect())
        .collect();

    let too_many_rows = rows.len() > config.max_rows;
    let too_large = !too_many_rows
        && serde_json::to_vec(&rows)
            .map(|bytes| bytes.len() > config.max_payload_bytes)
            .unwrap_or(true);

    if !too_many_rows && !too_large {
        let payload = AnalysisPayload::Rows {
            columns: table.columns.clone(),
            rows,
        };
        return (payload, false);
    }

    let positions = sample_positions(rows.len(), config.sample_size, config.method);
    let sample_rows = positions.iter().map(|&i| rows[i].clone()).collect();
    let digest = TableDigest {
        total_rows: table.row_count(),
        merged_rows: table.stats().merged_rows,
        columns: table.columns.clone(),
        method: config.method,
        sample_positions: positions,
        sample_rows,
        column_stats: table
            .columns
            .iter()
            .map(|c| summarize_column(c, &table.column_values(c)))
            .collect(),
    };
    (AnalysisPayload::Digest(digest), true)
}

/// Deterministic sample positions in ascending order
pub fn sample_positions(total: usize, sample_size: usize, method: SampleMethod) -> Vec<usize> {
    if total <= sample_size {
        return (0..total).collect();
    }
    match method {
        SampleMethod::Head => (0..sample_size).collect(),
        SampleMethod::Stride => (0..sample_size).map(|i| i * total / sample_size).collect(),
    }
}

fn summarize_column(name: &str, values: &[&Value]) -> ColumnSummary {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    let distinct: BTreeSet<String> = present.iter().map(|v| v.to_string()).collect();

    let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
    let numeric = (!numbers.is_empty() && numbers.len() == present.len()).then(|| {
        let sum: f64 = numbers.iter().sum();
        NumericSummary {
            min: numbers.iter().copied().fold(f64::INFINITY, f64::min),
            max: numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            sum: round2(sum),
            mean: round2(sum / numbers.len() as f64),
        }
    });

    let dates: Vec<NaiveDate> = present.iter().filter_map(|v| v.as_date()).collect();
    let date_range = match (dates.iter().min(), dates.iter().max()) {
        (Some(&earliest), Some(&latest)) => Some(DateRange { earliest, latest }),
        _ => None,
    };

    let top_values = if present.iter().all(|v| matches!(v, Value::Text(_))) {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for value in &present {
            *counts.entry(value.to_string()).or_default() += 1;
        }
        let mut ranked: Vec<ValueCount> = counts
            .into_iter()
            .map(|(value, count)| ValueCount { value, count })
            .collect();
        // Stable sort keeps alphabetical order among equal counts
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(TOP_VALUES);
        ranked
    } else {
        Vec::new()
    };

    ColumnSummary {
        name: name.to_string(),
        non_null: present.len(),
        distinct: distinct.len(),
        numeric,
        date_range,
        top_values,
    }
}

/// JSON form of a normalized value; dates are ISO strings
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedRow;

    fn table(rows: usize) -> NormalizedTable {
        NormalizedTable {
            report_type: "campus_assets".to_string(),
            columns: vec!["location".to_string(), "cost".to_string(), "bought".to_string()],
            rows: (0..rows)
                .map(|i| NormalizedRow {
                    source_index: i,
                    values: vec![
                        Value::Text(if i % 3 == 0 { "Hall" } else { "Lab" }.to_string()),
                        Value::Number(i as f64 * 10.0),
                        Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1 + (i % 28) as u32).unwrap()),
                    ],
                    merge_count: 1,
                })
                .collect(),
            base_currency: "INR".to_string(),
            rates_version: "v1".to_string(),
        }
    }

    #[test]
    fn test_small_table_sends_rows() {
        let (payload, sampled) = build_payload(&table(5), &DigestConfig::default());
        assert!(!sampled);
        match payload {
            AnalysisPayload::Rows { rows, .. } => {
                assert_eq!(rows.len(), 5);
                assert_eq!(rows[1][1], serde_json::json!(10.0));
                assert_eq!(rows[0][2], serde_json::json!("2023-01-01"));
            }
            other => panic!("expected rows, got {other:?}"),
        }
    }

    #[test]
    fn test_row_ceiling_produces_digest() {
        let config = DigestConfig::default()
            .with_max_rows(10)
            .with_sample(4, SampleMethod::Stride);
        let (payload, sampled) = build_payload(&table(12), &config);
        assert!(sampled);
        let AnalysisPayload::Digest(digest) = payload else {
            panic!("expected digest");
        };
        assert_eq!(digest.total_rows, 12);
        assert_eq!(digest.sample_positions, vec![0, 3, 6, 9]);
        assert_eq!(digest.sample_rows.len(), 4);

        let cost = &digest.column_stats[1];
        let numeric = cost.numeric.as_ref().unwrap();
        assert_eq!(numeric.min, 0.0);
        assert_eq!(numeric.max, 110.0);
        assert_eq!(numeric.sum, 660.0);

        let location = &digest.column_stats[0];
        assert_eq!(location.top_values[0].value, "Lab");
        assert_eq!(location.top_values[0].count, 8);
        assert!(digest.column_stats[2].date_range.is_some());
    }

    #[test]
    fn test_byte_ceiling_produces_digest() {
        let config = DigestConfig::default().with_max_payload_bytes(64);
        let (payload, sampled) = build_payload(&table(8), &config);
        assert!(sampled);
        assert!(payload.is_digest());
    }

    #[test]
    fn test_digest_is_deterministic() {
        let config = DigestConfig::default().with_max_rows(3);
        let (first, _) = build_payload(&table(40), &config);
        let (second, _) = build_payload(&table(40), &config);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_sample_positions() {
        assert_eq!(sample_positions(3, 5, SampleMethod::Stride), vec![0, 1, 2]);
        assert_eq!(sample_positions(10, 3, SampleMethod::Head), vec![0, 1, 2]);
        assert_eq!(sample_positions(10, 5, SampleMethod::Stride), vec![0, 2, 4, 6, 8]);
    }
}

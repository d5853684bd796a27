//! Data normalization
//!
//! Turns the valid rows of a raw table into a [`NormalizedTable`]: typed
//! values, money converted into the schema's base currency, cleaned text,
//! derived columns, and rows deduplicated on the schema's key columns.
//!
//! Normalization is a pure function of the raw table, the validation report,
//! the schema and the pinned rate table.

mod error;
mod rates;

use std::collections::HashMap;

use tracing::debug;

use crate::catalog::{ColumnSpec, ColumnType, Derivation, ReportSchema, TextCase};
use crate::models::{CellValue, NormalizedRow, NormalizedTable, RawTable, Value, round2};
use crate::validation::coerce::{cell_text, parse_date, parse_integer, parse_money, parse_number};
use crate::validation::{ColumnMapping, ValidationReport};

pub use error::{NormalizeError, NormalizeResult};
pub use rates::ExchangeRateTable;

/// Normalizes validated rows for one schema
pub struct DataNormalizer<'a> {
    schema: &'a ReportSchema,
    rates: &'a ExchangeRateTable,
}

impl<'a> DataNormalizer<'a> {
    pub fn new(schema: &'a ReportSchema, rates: &'a ExchangeRateTable) -> Self {
        Self { schema, rates }
    }

    /// Normalize the rows `report` marked valid
    pub fn normalize(
        &self,
        table: &RawTable,
        report: &ValidationReport,
    ) -> NormalizeResult<NormalizedTable> {
        let mapping = ColumnMapping::resolve(self.schema, table)?;
        let columns = self.schema.output_columns();
        let key_positions: Vec<usize> = self
            .schema
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.key)
            .map(|(idx, _)| idx)
            .collect();

        let mut rows: Vec<NormalizedRow> = Vec::with_capacity(report.valid_row_indices.len());
        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();

        for &row_index in &report.valid_row_indices {
            let mut values = Vec::with_capacity(columns.len());
            for spec in &self.schema.columns {
                let cell = match mapping.index_of(&spec.name) {
                    Some(col) => table.cell(row_index, col),
                    None => &CellValue::Blank,
                };
                let value = self.normalize_cell(spec, cell, row_index)?;
                if spec.required && value.is_null() {
                    return Err(NormalizeError::UnexpectedValue {
                        row_index,
                        column: spec.name.clone(),
                        expected: "non-blank value".to_string(),
                    });
                }
                values.push(value);
            }

            for derived in &self.schema.derived {
                let value = derive(&derived.derivation, &columns, &values).map_err(|reason| {
                    NormalizeError::Derivation {
                        column: derived.name.clone(),
                        row_index,
                        reason,
                    }
                })?;
                values.push(value);
            }

            if !key_positions.is_empty() {
                let key: Vec<String> =
                    key_positions.iter().map(|&i| values[i].to_string()).collect();
                if let Some(&existing) = seen.get(&key) {
                    rows[existing].merge_count += 1;
                    continue;
                }
                seen.insert(key, rows.len());
            }

            rows.push(NormalizedRow {
                source_index: row_index,
                values,
                merge_count: 1,
            });
        }

        debug!(
            report_type = %self.schema.report_type,
            valid_rows = report.valid_row_indices.len(),
            normalized_rows = rows.len(),
            rates_version = %self.rates.version,
            "Normalized table"
        );

        Ok(NormalizedTable {
            report_type: self.schema.report_type.clone(),
            columns,
            rows,
            base_currency: self.schema.base_currency.clone(),
            rates_version: self.rates.version.clone(),
        })
    }

    fn normalize_cell(
        &self,
        spec: &ColumnSpec,
        cell: &CellValue,
        row_index: usize,
    ) -> NormalizeResult<Value> {
        if cell.is_blank() {
            return Ok(Value::Null);
        }
        let unexpected = || NormalizeError::UnexpectedValue {
            row_index,
            column: spec.name.clone(),
            expected: spec.column_type.name().to_string(),
        };

        Ok(match spec.column_type {
            ColumnType::String => match cell_text(cell) {
                Some(text) => Value::Text(apply_case(&collapse_whitespace(&text), spec.case)),
                None => Value::Null,
            },
            ColumnType::Enum => {
                let text = collapse_whitespace(&cell_text(cell).ok_or_else(unexpected)?);
                let canonical = spec
                    .enum_values
                    .iter()
                    .find(|v| v.eq_ignore_ascii_case(&text))
                    .ok_or_else(unexpected)?;
                Value::Text(apply_case(canonical, spec.case))
            }
            ColumnType::Integer => Value::Integer(parse_integer(cell).ok_or_else(unexpected)?),
            ColumnType::Number => Value::Number(parse_number(cell).ok_or_else(unexpected)?),
            ColumnType::Currency => {
                let money = parse_money(cell).ok_or_else(unexpected)?;
                let base = self.schema.base_currency.as_str();
                let from = money.currency.as_deref().unwrap_or(base);
                Value::Number(round2(self.rates.convert(money.amount, from, base)?))
            }
            ColumnType::Date => Value::Date(parse_date(cell).ok_or_else(unexpected)?),
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn apply_case(text: &str, case: TextCase) -> String {
    match case {
        TextCase::Preserve => text.to_string(),
        TextCase::Lower => text.to_lowercase(),
        TextCase::Upper => text.to_uppercase(),
        TextCase::Title => text
            .split(' ')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" "),
    }
}

/// Compute one derived value from the values built so far
fn derive(derivation: &Derivation, columns: &[String], values: &[Value]) -> Result<Value, String> {
    let input = |name: &str| -> Result<f64, String> {
        let idx = columns
            .iter()
            .position(|c| c == name)
            .filter(|&i| i < values.len())
            .ok_or_else(|| format!("input column '{name}' is not available"))?;
        values[idx]
            .as_f64()
            .ok_or_else(|| format!("input column '{name}' has no numeric value"))
    };

    let result = match derivation {
        Derivation::Product { of } => of
            .iter()
            .try_fold(1.0, |acc, name| Ok::<_, String>(acc * input(name)?))?,
        Derivation::Sum { of } => of
            .iter()
            .try_fold(0.0, |acc, name| Ok::<_, String>(acc + input(name)?))?,
        Derivation::Difference {
            minuend,
            subtrahend,
        } => input(minuend)? - input(subtrahend)?,
        Derivation::Ratio {
            numerator,
            denominator,
        } => {
            let denominator = input(denominator)?;
            if denominator == 0.0 {
                return Err("division by zero".to_string());
            }
            input(numerator)? / denominator
        }
    };

    if !result.is_finite() {
        return Err(format!("result {result} is not finite"));
    }
    Ok(Value::Number(round2(result)))
}

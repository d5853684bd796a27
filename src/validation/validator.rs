//! Row-level validation of a raw table against a report schema

use std::collections::BTreeMap;

use tracing::debug;

use super::coerce::{cell_text, parse_date, parse_integer, parse_money, parse_number};
use super::error::{ValidationError, ValidationResult};
use super::report::{Rule, ValidationReport, Violation};
use crate::catalog::{ColumnSpec, ColumnType, ReportSchema};
use crate::models::{CellValue, RawTable};
use crate::normalize::ExchangeRateTable;

/// Which raw column feeds each schema column
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMapping {
    /// Schema column name -> raw column index
    pub indices: BTreeMap<String, usize>,
    /// Raw headers that matched no schema column
    pub unknown: Vec<String>,
}

impl ColumnMapping {
    /// Match raw headers to schema columns by normalized name or alias
    pub fn resolve(schema: &ReportSchema, table: &RawTable) -> ValidationResult<Self> {
        let headers = table.columns();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ValidationError::MalformedSchema(
                "header row is missing or empty".to_string(),
            ));
        }

        let mut mapping = ColumnMapping::default();
        for (idx, header) in headers.iter().enumerate() {
            match schema.resolve_header(header) {
                Some(spec) => {
                    if let Some(&previous) = mapping.indices.get(&spec.name) {
                        return Err(ValidationError::MalformedSchema(format!(
                            "headers '{}' and '{}' both map to column '{}'",
                            headers[previous], header, spec.name
                        )));
                    }
                    mapping.indices.insert(spec.name.clone(), idx);
                }
                None => {
                    if !header.trim().is_empty() {
                        mapping.unknown.push(header.clone());
                    }
                }
            }
        }
        Ok(mapping)
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.indices.get(column).copied()
    }
}

/// Checks each row of a raw table against one report schema
pub struct SchemaValidator<'a> {
    schema: &'a ReportSchema,
    rates: Option<&'a ExchangeRateTable>,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(schema: &'a ReportSchema) -> Self {
        Self {
            schema,
            rates: None,
        }
    }

    /// Also flag money amounts the rate table cannot convert to the schema's
    /// base currency
    pub fn with_rates(mut self, rates: &'a ExchangeRateTable) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Validate every row
    ///
    /// Returns `MalformedSchema` only when the header itself is unusable;
    /// every data problem is reported as a violation.
    pub fn validate(&self, table: &RawTable) -> ValidationResult<ValidationReport> {
        let mapping = ColumnMapping::resolve(self.schema, table)?;
        let mut report = ValidationReport {
            total_rows: table.row_count(),
            unknown_columns: mapping.unknown.clone(),
            ..Default::default()
        };

        for row_index in 0..table.row_count() {
            let before = report.violations.len();
            for spec in &self.schema.columns {
                let cell = match mapping.index_of(&spec.name) {
                    Some(idx) => table.cell(row_index, idx),
                    None => {
                        if spec.required {
                            report.violations.push(Violation {
                                row_index,
                                column: spec.name.clone(),
                                rule: Rule::MissingColumn,
                                message: format!(
                                    "required column '{}' is missing from the file",
                                    spec.display_label()
                                ),
                            });
                        }
                        continue;
                    }
                };
                check_cell(spec, cell, row_index, &mut report.violations);
                if spec.column_type == ColumnType::Currency {
                    self.check_convertible(spec, cell, row_index, &mut report.violations);
                }
            }
            if report.violations.len() == before {
                report.valid_row_indices.insert(row_index);
            }
        }

        debug!(
            report_type = %self.schema.report_type,
            rows = report.total_rows,
            valid = report.valid_count(),
            violations = report.violations.len(),
            unknown_columns = report.unknown_columns.len(),
            "Validation complete"
        );

        Ok(report)
    }

    fn check_convertible(
        &self,
        spec: &ColumnSpec,
        cell: &CellValue,
        row_index: usize,
        out: &mut Vec<Violation>,
    ) {
        let Some(rates) = self.rates else {
            return;
        };
        let Some(money) = parse_money(cell) else {
            return;
        };
        let base = self.schema.base_currency.as_str();
        let from = money.currency.as_deref().unwrap_or(base);
        if rates.convert(money.amount, from, base).is_err() {
            out.push(Violation {
                row_index,
                column: spec.name.clone(),
                rule: Rule::Currency,
                message: format!(
                    "{} is in {} but rate table '{}' has no rate to {}",
                    spec.display_label(),
                    from.to_uppercase(),
                    rates.version,
                    base.to_uppercase()
                ),
            });
        }
    }
}

fn check_cell(spec: &ColumnSpec, cell: &CellValue, row_index: usize, out: &mut Vec<Violation>) {
    let violation = |rule: Rule, message: String| Violation {
        row_index,
        column: spec.name.clone(),
        rule,
        message,
    };
    let label = spec.display_label();

    if cell.is_blank() {
        if spec.required {
            out.push(violation(Rule::Required, format!("{label} is required")));
        }
        return;
    }

    let numeric = match spec.column_type {
        ColumnType::Integer => match parse_integer(cell) {
            Some(v) => Some(v as f64),
            None => {
                out.push(violation(
                    Rule::Type,
                    format!("{label} must be a whole number, got '{cell}'"),
                ));
                return;
            }
        },
        ColumnType::Number => match parse_number(cell) {
            Some(v) => Some(v),
            None => {
                out.push(violation(
                    Rule::Type,
                    format!("{label} must be a number, got '{cell}'"),
                ));
                return;
            }
        },
        ColumnType::Currency => match parse_money(cell) {
            Some(money) => Some(money.amount),
            None => {
                out.push(violation(
                    Rule::Type,
                    format!("{label} must be a money amount, got '{cell}'"),
                ));
                return;
            }
        },
        ColumnType::Date => {
            if parse_date(cell).is_none() {
                out.push(violation(
                    Rule::Type,
                    format!("{label} must be a date, got '{cell}'"),
                ));
            }
            return;
        }
        ColumnType::String | ColumnType::Enum => None,
    };

    let constraints = &spec.constraints;
    if let Some(value) = numeric {
        if constraints.non_negative && value < 0.0 {
            out.push(violation(
                Rule::NonNegative,
                format!("{label} must not be negative, got {value}"),
            ));
        }
        if constraints.positive && value <= 0.0 {
            out.push(violation(
                Rule::Positive,
                format!("{label} must be greater than zero, got {value}"),
            ));
        }
        if let Some(min) = constraints.min
            && value < min
        {
            out.push(violation(
                Rule::Min,
                format!("{label} must be at least {min}, got {value}"),
            ));
        }
        if let Some(max) = constraints.max
            && value > max
        {
            out.push(violation(
                Rule::Max,
                format!("{label} must be at most {max}, got {value}"),
            ));
        }
        return;
    }

    let Some(text) = cell_text(cell) else {
        return;
    };

    if spec.column_type == ColumnType::Enum
        && !spec
            .enum_values
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&text))
    {
        out.push(violation(
            Rule::Enum,
            format!(
                "{label} must be one of [{}], got '{text}'",
                spec.enum_values.join(", ")
            ),
        ));
        return;
    }

    let length = text.chars().count();
    if let Some(min) = constraints.min_length
        && length < min
    {
        out.push(violation(
            Rule::MinLength,
            format!("{label} must be at least {min} characters"),
        ));
    }
    if let Some(max) = constraints.max_length
        && length > max
    {
        out.push(violation(
            Rule::MaxLength,
            format!("{label} must be at most {max} characters"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Constraints, SchemaCatalog};

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn asset_table(rows: Vec<Vec<CellValue>>) -> RawTable {
        RawTable::new(
            vec![
                "Device Name".to_string(),
                "Quantity".to_string(),
                "Description".to_string(),
                "Procurement Date".to_string(),
                "Location".to_string(),
                "Cost".to_string(),
                "Notes".to_string(),
            ],
            rows,
        )
    }

    fn good_row(device: &str) -> Vec<CellValue> {
        vec![
            text(device),
            text("2"),
            text("Dell Latitude"),
            text("2023-01-10"),
            text("Lab 1"),
            text("₹45,000"),
            text("anything"),
        ]
    }

    #[test]
    fn test_clean_table_has_no_violations() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let table = asset_table(vec![good_row("Laptop"), good_row("Projector")]);

        let report = SchemaValidator::new(schema).validate(&table).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.valid_count(), 2);
        assert_eq!(report.unknown_columns, vec!["Notes".to_string()]);
    }

    #[test]
    fn test_blank_required_cell_invalidates_only_that_row() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let mut bad = good_row("Printer");
        bad[5] = CellValue::Blank;
        let table = asset_table(vec![good_row("Laptop"), bad, good_row("Projector")]);

        let report = SchemaValidator::new(schema).validate(&table).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].row_index, 1);
        assert_eq!(report.violations[0].rule, Rule::Required);
        assert_eq!(report.valid_row_indices.iter().copied().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_type_and_constraint_violations() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let mut row = good_row("Laptop");
        row[1] = text("0");
        row[3] = text("someday");
        row[5] = text("-10");
        let table = asset_table(vec![row]);

        let report = SchemaValidator::new(schema).validate(&table).unwrap();
        let rules: Vec<Rule> = report.violations.iter().map(|v| v.rule).collect();
        assert_eq!(rules, vec![Rule::Positive, Rule::Type, Rule::NonNegative]);
        assert!(report.valid_row_indices.is_empty());
    }

    #[test]
    fn test_missing_required_column_flags_every_row() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let table = RawTable::new(
            vec!["Device Name".to_string(), "Quantity".to_string()],
            vec![vec![text("Laptop"), text("1")]],
        );

        let report = SchemaValidator::new(schema).validate(&table).unwrap();
        assert!(report.violations.iter().all(|v| v.rule == Rule::MissingColumn));
        assert_eq!(report.violations.len(), 4);
        assert_eq!(report.valid_count(), 0);
    }

    #[test]
    fn test_duplicate_header_is_malformed() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let table = RawTable::new(
            vec!["Cost".to_string(), "Amount".to_string()],
            vec![vec![text("1"), text("2")]],
        );

        let err = SchemaValidator::new(schema).validate(&table).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedSchema(_)));
    }

    #[test]
    fn test_empty_header_is_malformed() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let table = RawTable::new(vec![" ".to_string()], vec![vec![text("x")]]);
        assert!(SchemaValidator::new(schema).validate(&table).is_err());
    }

    #[test]
    fn test_enum_and_length_rules() {
        let mut spec = ColumnSpec::new("status", ColumnType::Enum);
        spec.enum_values = vec!["Active".to_string(), "Retired".to_string()];
        let mut violations = Vec::new();
        check_cell(&spec, &text("active"), 0, &mut violations);
        assert!(violations.is_empty());
        check_cell(&spec, &text("lost"), 0, &mut violations);
        assert_eq!(violations[0].rule, Rule::Enum);

        let spec = ColumnSpec::new("code", ColumnType::String).with_constraints(Constraints {
            min_length: Some(3),
            max_length: Some(4),
            ..Default::default()
        });
        let mut violations = Vec::new();
        check_cell(&spec, &text("ab"), 0, &mut violations);
        check_cell(&spec, &text("abcde"), 1, &mut violations);
        check_cell(&spec, &text("abc"), 2, &mut violations);
        let rules: Vec<Rule> = violations.iter().map(|v| v.rule).collect();
        assert_eq!(rules, vec![Rule::MinLength, Rule::MaxLength]);
    }

    #[test]
    fn test_unconvertible_currency_is_a_row_violation() {
        let catalog = SchemaCatalog::builtin().unwrap();
        let schema = catalog.require("campus_assets").unwrap();
        let rates = ExchangeRateTable::identity("INR").with_rate("EUR", 90.0);
        let mut dollars = good_row("Router");
        dollars[5] = text("$850");
        let mut euros = good_row("Switch");
        euros[5] = text("€120");
        let table = asset_table(vec![good_row("Laptop"), dollars, euros]);

        let report = SchemaValidator::new(schema)
            .with_rates(&rates)
            .validate(&table)
            .unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].row_index, 1);
        assert_eq!(report.violations[0].rule, Rule::Currency);
        assert!(report.violations[0].message.contains("USD"));
        assert_eq!(report.valid_row_indices.iter().copied().collect::<Vec<_>>(), vec![0, 2]);

        // Without a rate table only the amount itself is checked
        let report = SchemaValidator::new(schema).validate(&table).unwrap();
        assert!(report.is_clean());
    }
}

//! Validation report types

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The rule a violation broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// A required column is absent from the header
    MissingColumn,
    /// A required cell is blank
    Required,
    /// The cell cannot be read as the column type
    Type,
    NonNegative,
    Positive,
    Min,
    Max,
    MinLength,
    MaxLength,
    /// Value outside the enum's allowed set
    Enum,
    /// Amount in a currency the rate table cannot convert
    Currency,
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::MissingColumn => "missing_column",
            Rule::Required => "required",
            Rule::Type => "type",
            Rule::NonNegative => "non_negative",
            Rule::Positive => "positive",
            Rule::Min => "min",
            Rule::Max => "max",
            Rule::MinLength => "min_length",
            Rule::MaxLength => "max_length",
            Rule::Enum => "enum",
            Rule::Currency => "currency",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One rule violation in one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Zero-based data row index
    pub row_index: usize,
    /// Canonical column name
    pub column: String,
    pub rule: Rule,
    pub message: String,
}

/// Outcome of validating a raw table against a schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    /// Rows with no violations
    pub valid_row_indices: BTreeSet<usize>,
    pub violations: Vec<Violation>,
    /// Headers that matched no schema column; these are ignored
    pub unknown_columns: Vec<String>,
}

impl ValidationReport {
    pub fn valid_count(&self) -> usize {
        self.valid_row_indices.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.total_rows - self.valid_row_indices.len()
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_valid_rows(&self) -> bool {
        !self.valid_row_indices.is_empty()
    }

    pub fn is_valid_row(&self, row_index: usize) -> bool {
        self.valid_row_indices.contains(&row_index)
    }

    pub fn violations_for_row(&self, row_index: usize) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(move |v| v.row_index == row_index)
    }

    /// Violation counts per rule
    pub fn counts_by_rule(&self) -> BTreeMap<Rule, usize> {
        let mut counts = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.rule).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let report = ValidationReport {
            total_rows: 3,
            valid_row_indices: [0, 2].into_iter().collect(),
            violations: vec![
                Violation {
                    row_index: 1,
                    column: "cost".to_string(),
                    rule: Rule::Required,
                    message: "cost is required".to_string(),
                },
                Violation {
                    row_index: 1,
                    column: "quantity".to_string(),
                    rule: Rule::Type,
                    message: "quantity must be an integer".to_string(),
                },
            ],
            unknown_columns: Vec::new(),
        };

        assert_eq!(report.valid_count(), 2);
        assert_eq!(report.invalid_count(), 1);
        assert!(!report.is_clean());
        assert_eq!(report.violations_for_row(1).count(), 2);
        assert_eq!(report.counts_by_rule().get(&Rule::Type), Some(&1));
    }

    #[test]
    fn test_rule_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Rule::MissingColumn).unwrap(),
            "\"missing_column\""
        );
    }
}

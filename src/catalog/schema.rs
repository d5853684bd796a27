//! Report schema definitions
//!
//! A `ReportSchema` describes one report type: the columns an upload must
//! carry, how they are typed and constrained, which columns identify a
//! duplicate row, which derived columns to compute, and which charts to draw.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::{CatalogError, CatalogResult};

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Number,
    /// Money amount, possibly carrying a currency symbol or code
    Currency,
    Date,
    /// One of `ColumnSpec::enum_values`
    Enum,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::Number | ColumnType::Currency
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Number => "number",
            ColumnType::Currency => "currency",
            ColumnType::Date => "date",
            ColumnType::Enum => "enum",
        }
    }
}

/// Casing applied to string values during normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCase {
    #[default]
    Preserve,
    Lower,
    Upper,
    Title,
}

/// Domain constraints on a column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub non_negative: bool,
    #[serde(default)]
    pub positive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// A column the report type understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Canonical column name (already in normalized header form)
    pub name: String,
    /// Human label for reports; defaults to the name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Alternative header spellings
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub required: bool,
    /// Part of the duplicate-detection key
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub case: TextCase,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            label: None,
            aliases: Vec::new(),
            column_type,
            required: false,
            key: false,
            constraints: Constraints::default(),
            enum_values: Vec::new(),
            case: TextCase::Preserve,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Label shown in reports
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| humanize(&self.name))
    }

    /// Does a raw header name refer to this column?
    pub fn matches_header(&self, header: &str) -> bool {
        let normalized = normalize_header(header);
        !normalized.is_empty()
            && (normalized == self.name
                || self.aliases.iter().any(|a| normalize_header(a) == normalized))
    }
}

/// How a derived column is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Derivation {
    /// Product of all inputs
    Product { of: Vec<String> },
    /// Sum of all inputs
    Sum { of: Vec<String> },
    Difference { minuend: String, subtrahend: String },
    Ratio { numerator: String, denominator: String },
}

impl Derivation {
    /// Columns the derivation reads
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Derivation::Product { of } | Derivation::Sum { of } => {
                of.iter().map(String::as_str).collect()
            }
            Derivation::Difference {
                minuend,
                subtrahend,
            } => vec![minuend.as_str(), subtrahend.as_str()],
            Derivation::Ratio {
                numerator,
                denominator,
            } => vec![numerator.as_str(), denominator.as_str()],
        }
    }
}

/// A column computed from other columns after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub derivation: Derivation,
}

impl DerivedColumn {
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| humanize(&self.name))
    }
}

/// Chart drawing style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    HorizontalBar,
    Line,
}

/// Where a chart gets its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ChartSource {
    /// Sum of `value` per distinct `group_by`, largest `top` groups
    GroupSum {
        group_by: String,
        value: String,
        #[serde(default = "default_top")]
        top: usize,
    },
    /// Sum of `value` per distinct `x` in ascending `x` order
    Series { x: String, value: String },
    /// Named metrics from the analysis result
    Metrics { names: Vec<String> },
}

fn default_top() -> usize {
    10
}

/// A chart configured for a report type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    #[serde(flatten)]
    pub source: ChartSource,
}

/// Columns the inventory analytics read
///
/// Reports without this block get no age, utilization or high-value sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryColumns {
    /// What each row counts, e.g. the device name
    pub item: String,
    pub quantity: String,
    pub location: String,
    /// Date the item was acquired
    pub acquired: String,
    /// Price of one unit
    pub unit_cost: String,
}

/// Full definition of one report type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSchema {
    pub report_type: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    /// Zero-based row index of the header; defaults to the first non-empty row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub derived: Vec<DerivedColumn>,
    #[serde(default)]
    pub charts: Vec<ChartSpec>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Extra instructions passed to the analysis service
    #[serde(default)]
    pub analysis_instructions: String,
    /// Columns shown in the record details table (empty means all)
    #[serde(default)]
    pub detail_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventoryColumns>,
}

fn default_base_currency() -> String {
    "INR".to_string()
}

impl ReportSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn derived_column(&self, name: &str) -> Option<&DerivedColumn> {
        self.derived.iter().find(|d| d.name == name)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.key)
    }

    pub fn required_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.required)
    }

    /// Find the column a raw header refers to
    pub fn resolve_header(&self, header: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.matches_header(header))
    }

    /// Normalized table columns: declared columns then derived columns
    pub fn output_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.name.clone())
            .chain(self.derived.iter().map(|d| d.name.clone()))
            .collect()
    }

    /// Is `name` numeric once normalized (numeric column or any derived column)?
    pub fn is_numeric_output(&self, name: &str) -> bool {
        self.column(name)
            .map(|c| c.column_type.is_numeric())
            .unwrap_or_else(|| self.derived_column(name).is_some())
    }

    /// Label of a declared or derived column
    pub fn label_for(&self, name: &str) -> String {
        if let Some(column) = self.column(name) {
            column.display_label()
        } else if let Some(derived) = self.derived_column(name) {
            derived.display_label()
        } else {
            humanize(name)
        }
    }

    /// Check internal consistency
    pub fn validate(&self) -> CatalogResult<()> {
        let rt = self.report_type.as_str();
        if rt.trim().is_empty() {
            return Err(CatalogError::invalid(rt, "report_type must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(CatalogError::invalid(rt, "at least one column is required"));
        }

        let mut names = BTreeSet::new();
        let mut spellings = BTreeSet::new();
        for column in &self.columns {
            if normalize_header(&column.name) != column.name {
                return Err(CatalogError::invalid(
                    rt,
                    format!(
                        "column name '{}' must be lower_snake_case",
                        column.name
                    ),
                ));
            }
            if !names.insert(column.name.clone()) {
                return Err(CatalogError::invalid(
                    rt,
                    format!("duplicate column '{}'", column.name),
                ));
            }
            for spelling in std::iter::once(column.name.clone())
                .chain(column.aliases.iter().map(|a| normalize_header(a)))
            {
                if !spellings.insert(spelling.clone()) {
                    return Err(CatalogError::invalid(
                        rt,
                        format!("header spelling '{spelling}' maps to more than one column"),
                    ));
                }
            }
            if column.column_type == ColumnType::Enum && column.enum_values.is_empty() {
                return Err(CatalogError::invalid(
                    rt,
                    format!("enum column '{}' has no enum_values", column.name),
                ));
            }
        }

        for derived in &self.derived {
            if !names.insert(derived.name.clone()) {
                return Err(CatalogError::invalid(
                    rt,
                    format!("derived column '{}' collides with another column", derived.name),
                ));
            }
            let inputs = derived.derivation.inputs();
            if inputs.is_empty() {
                return Err(CatalogError::invalid(
                    rt,
                    format!("derived column '{}' has no inputs", derived.name),
                ));
            }
            for input in inputs {
                let earlier_derived = self
                    .derived
                    .iter()
                    .take_while(|d| d.name != derived.name)
                    .any(|d| d.name == input);
                if earlier_derived {
                    continue;
                }
                let Some(column) = self.column(input).filter(|c| c.column_type.is_numeric())
                else {
                    return Err(CatalogError::invalid(
                        rt,
                        format!(
                            "derived column '{}' reads '{}', which is not an earlier numeric column",
                            derived.name, input
                        ),
                    ));
                };
                // Optional inputs would leave valid rows with nothing to compute from
                if !column.required {
                    return Err(CatalogError::invalid(
                        rt,
                        format!(
                            "derived column '{}' reads '{}', which must be required",
                            derived.name, input
                        ),
                    ));
                }
            }
            if let Derivation::Ratio { denominator, .. } = &derived.derivation {
                let positive = self
                    .column(denominator)
                    .map(|c| c.constraints.positive)
                    .unwrap_or(false);
                if !positive {
                    return Err(CatalogError::invalid(
                        rt,
                        format!(
                            "ratio '{}' divides by '{}', which must be a declared column with the positive constraint",
                            derived.name, denominator
                        ),
                    ));
                }
            }
        }

        let mut chart_ids = BTreeSet::new();
        for chart in &self.charts {
            if !chart_ids.insert(chart.id.clone()) {
                return Err(CatalogError::invalid(
                    rt,
                    format!("duplicate chart id '{}'", chart.id),
                ));
            }
            let referenced: Vec<&str> = match &chart.source {
                ChartSource::GroupSum {
                    group_by, value, ..
                } => vec![group_by.as_str(), value.as_str()],
                ChartSource::Series { x, value } => vec![x.as_str(), value.as_str()],
                ChartSource::Metrics { names } => {
                    if names.is_empty() {
                        return Err(CatalogError::invalid(
                            rt,
                            format!("chart '{}' lists no metrics", chart.id),
                        ));
                    }
                    Vec::new()
                }
            };
            for column in referenced {
                if !names.contains(column) {
                    return Err(CatalogError::invalid(
                        rt,
                        format!("chart '{}' references unknown column '{}'", chart.id, column),
                    ));
                }
            }
        }

        for column in &self.detail_columns {
            if !names.contains(column) {
                return Err(CatalogError::invalid(
                    rt,
                    format!("detail column '{column}' is not defined"),
                ));
            }
        }

        if let Some(inventory) = &self.inventory {
            let roles: [(&str, &str, fn(ColumnType) -> bool, &str); 5] = [
                ("item", inventory.item.as_str(), |_| true, "any type"),
                ("quantity", inventory.quantity.as_str(), |t| t.is_numeric(), "numeric"),
                ("location", inventory.location.as_str(), |_| true, "any type"),
                ("acquired", inventory.acquired.as_str(), |t| t == ColumnType::Date, "a date"),
                ("unit_cost", inventory.unit_cost.as_str(), |t| t.is_numeric(), "numeric"),
            ];
            for (role, name, fits, expected) in roles {
                let Some(column) = self.column(name) else {
                    return Err(CatalogError::invalid(
                        rt,
                        format!("inventory {role} column '{name}' is not defined"),
                    ));
                };
                if !fits(column.column_type) {
                    return Err(CatalogError::invalid(
                        rt,
                        format!("inventory {role} column '{name}' must be {expected}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Normalize a header: lowercase, non-alphanumeric runs become `_`
///
/// `"Device Name"` and `"device-name"` both become `"device_name"`;
/// `"Cost (Rs.)"` becomes `"cost_rs"`.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `procurement_date` -> `Procurement Date`
pub fn humanize(name: &str) -> String {
    name.split('_')
        .filter(|p| !p.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

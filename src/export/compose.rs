//! Report composition
//!
//! Turns a normalized table, its validation report, the analysis result and
//! the rendered charts into a [`ReportDocument`]. Composition is pure: the
//! same inputs and `generated_at` always give the same document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chart::ChartOutcome;
use super::inventory::{InventoryAnalytics, Utilization};
use super::{format_amount, is_money_column};
use crate::catalog::ReportSchema;
use crate::models::{AnalysisResult, NormalizedTable, ReportDocument, Section, Value};
use crate::validation::ValidationReport;

/// Limits applied while composing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Rows listed in the record details section
    #[serde(default = "default_detail_limit")]
    pub detail_limit: usize,

    /// Longest cell text in the details section; longer text ends in "..."
    #[serde(default = "default_cell_width")]
    pub cell_width: usize,

    /// Violations listed by the data quality section
    #[serde(default = "default_violation_limit")]
    pub violation_limit: usize,

    /// Unit cost, in the base currency, from which an item counts as high value
    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold: f64,

    /// Items listed by the high-value section
    #[serde(default = "default_high_value_limit")]
    pub high_value_limit: usize,
}

fn default_detail_limit() -> usize {
    50
}

fn default_cell_width() -> usize {
    25
}

fn default_violation_limit() -> usize {
    10
}

fn default_high_value_threshold() -> f64 {
    100_000.0
}

fn default_high_value_limit() -> usize {
    20
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            detail_limit: default_detail_limit(),
            cell_width: default_cell_width(),
            violation_limit: default_violation_limit(),
            high_value_threshold: default_high_value_threshold(),
            high_value_limit: default_high_value_limit(),
        }
    }
}

impl ComposeConfig {
    pub fn with_high_value_threshold(mut self, threshold: f64) -> Self {
        self.high_value_threshold = threshold;
        self
    }
}

/// Builds report documents for one schema
#[derive(Debug, Clone)]
pub struct ReportComposer<'a> {
    schema: &'a ReportSchema,
    config: ComposeConfig,
}

impl<'a> ReportComposer<'a> {
    pub fn new(schema: &'a ReportSchema, config: ComposeConfig) -> Self {
        Self { schema, config }
    }

    /// Compose the report
    pub fn compose(
        &self,
        table: &NormalizedTable,
        validation: &ValidationReport,
        analysis: &AnalysisResult,
        charts: &[ChartOutcome],
        generated_at: DateTime<Utc>,
    ) -> ReportDocument {
        let mut sections = vec![
            Section::new("Summary", self.summary(table, analysis, generated_at)),
        ];

        if !analysis.key_findings.is_empty() {
            let findings = analysis
                .key_findings
                .iter()
                .map(|f| format!("- {}", f.trim()))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(Section::new("Key Findings", findings));
        }

        if let Some(metrics) = self.metrics(table, analysis) {
            sections.push(Section::new("Metrics", metrics));
        }

        let mut images = Vec::new();
        let mut notes = Vec::new();
        for outcome in charts {
            match outcome {
                ChartOutcome::Rendered { image, caption } => {
                    sections.push(Section::new(image.title.clone(), caption.clone()).with_chart(&image.id));
                    images.push(image.clone());
                }
                ChartOutcome::Skipped { title, reason, .. } => {
                    notes.push(format!("Chart \"{title}\" was not drawn: {reason}."));
                }
            }
        }

        if let Some(columns) = &self.schema.inventory
            && !table.rows.is_empty()
        {
            let analytics = InventoryAnalytics::compute(
                table,
                columns,
                generated_at.date_naive(),
                self.config.high_value_threshold,
            );
            sections.push(Section::new(
                "Equipment Age",
                self.equipment_age(&analytics, generated_at),
            ));
            if let Some(utilization) = &analytics.utilization {
                sections.push(Section::new(
                    "Resource Utilization",
                    self.utilization(utilization),
                ));
            }
            sections.push(Section::new(
                "High-Value Items",
                self.high_value(&analytics, &table.base_currency),
            ));
        }

        sections.push(Section::new("Data Quality", self.data_quality(validation)));

        let (details, truncated) = self.details(table);
        sections.push(Section::new("Record Details", details));
        if truncated {
            notes.push(format!(
                "Record details show the first {} of {} records.",
                self.config.detail_limit,
                table.row_count()
            ));
        }

        ReportDocument {
            title: self.schema.title.clone(),
            subtitle: self.schema.subtitle.clone(),
            generated_at,
            sections,
            charts: images,
            notes,
        }
    }

    fn summary(
        &self,
        table: &NormalizedTable,
        analysis: &AnalysisResult,
        generated_at: DateTime<Utc>,
    ) -> String {
        let stats = table.stats();
        let mut lines = vec![
            format!("Generated on: {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            format!("Total records: {}", stats.row_count),
        ];
        if stats.merged_rows > 0 {
            lines.push(format!("Duplicate rows merged: {}", stats.merged_rows));
        }
        lines.push(format!(
            "Amounts in {} (exchange rates: {})",
            table.base_currency, table.rates_version
        ));
        lines.push(String::new());
        lines.push(analysis.summary_text.trim().to_string());
        if analysis.sampled {
            lines.push(String::new());
            lines.push(
                "The analysis was based on a representative sample and column statistics \
                 rather than every record."
                    .to_string(),
            );
        }
        lines.push(String::new());
        lines.push(format!(
            "Analysis confidence: {:.0}% (model {})",
            analysis.confidence * 100.0,
            analysis.model
        ));
        lines.join("\n")
    }

    fn metrics(&self, table: &NormalizedTable, analysis: &AnalysisResult) -> Option<String> {
        let mut lines: Vec<String> = analysis
            .metrics
            .iter()
            .map(|(name, value)| {
                format!("- {}: {}", self.schema.label_for(name), format_amount(*value))
            })
            .collect();

        let stats = table.stats();
        for (column, total) in &stats.numeric_totals {
            let value = if self.is_money(column) {
                format!("{} {}", table.base_currency, format_amount(*total))
            } else {
                format_amount(*total)
            };
            lines.push(format!("- Total {}: {}", self.schema.label_for(column), value));
        }
        for (column, distinct) in &stats.distinct_values {
            if self.schema.column(column).is_some_and(|c| c.key) {
                lines.push(format!(
                    "- Distinct {}: {}",
                    self.schema.label_for(column),
                    distinct
                ));
            }
        }

        (!lines.is_empty()).then(|| lines.join("\n"))
    }

    fn equipment_age(&self, analytics: &InventoryAnalytics, generated_at: DateTime<Utc>) -> String {
        let mut lines = vec![format!(
            "Units by age on {}:",
            generated_at.format("%Y-%m-%d")
        )];
        for (band, units) in &analytics.units_by_age {
            lines.push(format!("- {}: {}", band.label(), Value::Number(*units)));
        }
        if analytics.units_by_age.is_empty() {
            lines.push("- No units recorded.".to_string());
        }
        lines.join("\n")
    }

    fn utilization(&self, utilization: &Utilization) -> String {
        [
            format!("- Locations: {}", utilization.locations),
            format!(
                "- Average units per location: {}",
                format_amount(utilization.average_per_location)
            ),
            format!(
                "- Most units: {} ({})",
                utilization.busiest_location,
                Value::Number(utilization.busiest_units)
            ),
            format!(
                "- Fewest units: {} ({})",
                utilization.quietest_location,
                Value::Number(utilization.quietest_units)
            ),
            format!("- Most common item: {}", utilization.most_common_item),
            format!(
                "- Item diversity: {:.2} distinct items per record",
                utilization.diversity
            ),
        ]
        .join("\n")
    }

    fn high_value(&self, analytics: &InventoryAnalytics, currency: &str) -> String {
        let threshold = format!(
            "{currency} {}",
            format_amount(self.config.high_value_threshold)
        );
        if analytics.high_value.is_empty() {
            return format!("No item has a unit cost of {threshold} or more.");
        }

        let mut lines = vec![format!(
            "Items with a unit cost of {threshold} or more: {}",
            analytics.high_value.len()
        )];
        for item in analytics.high_value.iter().take(self.config.high_value_limit) {
            lines.push(format!(
                "- {} ({}): {currency} {} x {}",
                item.item,
                item.location,
                format_amount(item.unit_cost),
                Value::Number(item.quantity)
            ));
        }
        let remaining = analytics
            .high_value
            .len()
            .saturating_sub(self.config.high_value_limit);
        if remaining > 0 {
            lines.push(format!("- ... and {remaining} more"));
        }
        lines.join("\n")
    }

    fn data_quality(&self, validation: &ValidationReport) -> String {
        let mut lines = vec![
            format!("Rows received: {}", validation.total_rows),
            format!("Rows accepted: {}", validation.valid_count()),
            format!("Rows rejected: {}", validation.invalid_count()),
        ];

        if validation.is_clean() {
            lines.push(String::new());
            lines.push("No validation problems were found.".to_string());
        } else {
            lines.push(String::new());
            lines.push("Problems by rule:".to_string());
            for (rule, count) in validation.counts_by_rule() {
                lines.push(format!("- {rule}: {count}"));
            }
            lines.push(String::new());
            lines.push("First problems:".to_string());
            for violation in validation.violations.iter().take(self.config.violation_limit) {
                lines.push(format!(
                    "- Row {}, {}: {}",
                    violation.row_index + 1,
                    self.schema.label_for(&violation.column),
                    violation.message
                ));
            }
            let remaining = validation
                .violations
                .len()
                .saturating_sub(self.config.violation_limit);
            if remaining > 0 {
                lines.push(format!("- ... and {remaining} more"));
            }
        }

        if !validation.unknown_columns.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "Ignored columns: {}",
                validation.unknown_columns.join(", ")
            ));
        }
        lines.join("\n")
    }

    /// Detail listing; the flag is true when rows were left out
    fn details(&self, table: &NormalizedTable) -> (String, bool) {
        let columns: Vec<&str> = if self.schema.detail_columns.is_empty() {
            table.columns.iter().map(String::as_str).collect()
        } else {
            self.schema
                .detail_columns
                .iter()
                .map(String::as_str)
                .filter(|c| table.column_index(c).is_some())
                .collect()
        };

        let header = columns
            .iter()
            .map(|c| self.schema.label_for(c))
            .collect::<Vec<_>>()
            .join(" | ");
        let mut lines = vec![format!("#  | {header}")];

        for (i, row) in table.rows.iter().take(self.config.detail_limit).enumerate() {
            let cells = columns
                .iter()
                .map(|c| {
                    let value = table.value(row, c);
                    truncate(&self.display(c, value), self.config.cell_width)
                })
                .collect::<Vec<_>>()
                .join(" | ");
            lines.push(format!("{:<2} | {cells}", i + 1));
        }

        if table.rows.is_empty() {
            lines.push("No records.".to_string());
        }
        (lines.join("\n"), table.row_count() > self.config.detail_limit)
    }

    fn display(&self, column: &str, value: &Value) -> String {
        match value {
            Value::Null => "-".to_string(),
            Value::Number(n) if self.is_money(column) => format_amount(*n),
            other => other.to_string(),
        }
    }

    fn is_money(&self, column: &str) -> bool {
        is_money_column(self.schema, column)
    }
}

/// Shorten `text` to `width` characters, ending in "..." when cut
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let keep = width.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

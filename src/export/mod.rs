//! Report output
//!
//! - [`ChartRenderer`]: charts configured by the schema, as raster images
//! - [`ReportComposer`]: assembles the [`ReportDocument`](crate::models::ReportDocument)
//! - [`InventoryAnalytics`]: age, utilization and high-value figures for inventory reports
//! - [`PdfEmitter`]: serializes a document into PDF bytes

pub mod chart;
pub mod compose;
pub mod error;
pub mod inventory;
pub mod pdf;

pub use chart::{ChartOutcome, ChartRenderer, ChartStyle, DataPoint};
pub use compose::{ComposeConfig, ReportComposer};
pub use error::{ExportError, ExportResult};
pub use inventory::{AgeBand, InventoryAnalytics};
pub use pdf::{BrandingConfig, PageSize, PdfEmitter, PdfOutput};

use crate::catalog::{ColumnType, Derivation, ReportSchema};

/// Two decimals with thousands separators: `1234567.5` -> `1,234,567.50`
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

/// Does `column` hold money once normalized?
///
/// Currency columns do, and so do products, sums and differences involving
/// one. Ratios never do.
pub(crate) fn is_money_column(schema: &ReportSchema, column: &str) -> bool {
    if let Some(spec) = schema.column(column) {
        return spec.column_type == ColumnType::Currency;
    }
    match schema.derived_column(column).map(|d| &d.derivation) {
        Some(Derivation::Product { of }) | Some(Derivation::Sum { of }) => {
            of.iter().any(|name| is_money_column(schema, name))
        }
        Some(Derivation::Difference { minuend, .. }) => is_money_column(schema, minuend),
        Some(Derivation::Ratio { .. }) | None => false,
    }
}

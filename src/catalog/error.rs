//! Error types for the schema catalog

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or querying the schema catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog source could not be read
    #[error("Failed to read catalog {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Catalog source is not valid YAML/JSON for the catalog model
    #[error("Failed to parse {format} catalog: {message}")]
    Parse { format: String, message: String },

    /// Catalog file extension is not supported
    #[error("Unsupported catalog format: {0}")]
    UnsupportedFormat(String),

    /// A schema is internally inconsistent
    #[error("Invalid schema '{report_type}': {reason}")]
    InvalidSchema { report_type: String, reason: String },

    /// The same report type is declared twice
    #[error("Duplicate report type: {0}")]
    DuplicateReportType(String),

    /// No schema for the requested report type
    #[error("Unknown report type: {0}")]
    UnknownReportType(String),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    pub(crate) fn invalid(report_type: &str, reason: impl Into<String>) -> Self {
        CatalogError::InvalidSchema {
            report_type: report_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::UnknownReportType(report_type) => format!(
                "Unknown report type '{report_type}'.\n\nHint: List the available report types with the `catalog` command."
            ),
            CatalogError::UnsupportedFormat(ext) => format!(
                "Unsupported catalog format '{ext}'.\n\nHint: Use a .yaml, .yml or .json catalog file."
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::invalid("campus_assets", "duplicate column 'cost'");
        assert_eq!(
            err.to_string(),
            "Invalid schema 'campus_assets': duplicate column 'cost'"
        );
    }

    #[test]
    fn test_user_message_hint() {
        let msg = CatalogError::UnknownReportType("payroll".to_string()).user_message();
        assert!(msg.contains("payroll"));
        assert!(msg.contains("Hint:"));
    }
}

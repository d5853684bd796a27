//! Error types for chart rendering and PDF emission

use thiserror::Error;

/// Errors that can occur while producing report output
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    /// The report document is missing required parts or has dangling references
    #[error("Malformed report document: {0}")]
    MalformedDocument(String),

    /// A chart could not be drawn or encoded
    #[error("Chart error: {0}")]
    Chart(String),

    /// Byte-level encoding failed
    #[error("Encoding error: {0}")]
    Encode(String),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ExportError::MalformedDocument(_) => {
                "The report could not be rendered because of an internal error.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

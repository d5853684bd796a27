//! Error types for schema validation

use thiserror::Error;

/// Structural problems that prevent validating a table at all
///
/// Bad data never produces one of these; it produces violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Malformed header: {0}")]
    MalformedSchema(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

impl ValidationError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::MalformedSchema(msg) => format!(
                "The file's header row could not be understood: {msg}\n\n\
                Hint: Make sure the first non-empty row holds column names and each name appears once."
            ),
        }
    }
}

//! Error types for report delivery

use thiserror::Error;

/// Errors that end a delivery
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    /// The transport refused the message for good
    #[error("Delivery to {recipient} failed permanently: {message}")]
    Permanent { recipient: String, message: String },

    /// Every attempt failed with a retryable error
    #[error("Delivery to {recipient} failed after {attempts} attempts: {last}")]
    Exhausted {
        recipient: String,
        attempts: u32,
        last: String,
    },

    /// The record already ended in failure and will not be retried
    #[error("Delivery to {0} already failed")]
    AlreadyFailed(String),

    /// Recipient address is not usable
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// Transport configuration is incomplete
    #[error("Mail transport configuration error: {0}")]
    Config(String),
}

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

impl DeliveryError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::Permanent { recipient, .. } => format!(
                "The report email to {recipient} was rejected.\n\n\
                Hint: Check the recipient address."
            ),
            DeliveryError::Exhausted { recipient, .. } => format!(
                "The report email to {recipient} could not be sent.\n\n\
                Hint: The mail service may be unavailable. The report itself was generated."
            ),
            DeliveryError::InvalidRecipient(address) => format!(
                "'{address}' is not a valid email address.\n\n\
                Hint: Use an address of the form name@example.org."
            ),
            _ => self.to_string(),
        }
    }
}

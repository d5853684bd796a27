//! Outgoing mail messages

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::error::{DeliveryError, DeliveryResult};

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/pdf".to_string(),
            bytes,
        }
    }

    /// Content as standard base64
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// One message handed to a [`MailTransport`](super::MailTransport)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Stable key for the logical delivery; transports pass it on so that a
    /// repeated send is recognized as the same message
    pub idempotency_key: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl MailMessage {
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Minimal address check: one `@`, non-empty local part, dotted domain
pub fn validate_address(address: &str) -> DeliveryResult<()> {
    let address = address.trim();
    let invalid = || DeliveryError::InvalidRecipient(address.to_string());

    let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || address.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(())
}

//! Mail transport seam
//!
//! Transports report failures as opaque strings. [`classify_failure`] decides
//! whether a failure is worth another attempt.

use async_trait::async_trait;
use tracing::info;

use super::message::MailMessage;

/// Sends one message
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send `message`; the error string describes the failure
    async fn send(&self, message: &MailMessage) -> Result<(), String>;

    /// Transport name for logs
    fn name(&self) -> &str;
}

/// Whether a failed send may succeed if repeated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Permanent,
}

const PERMANENT_MARKERS: &[&str] = &[
    "permanent",
    "rejected",
    "invalid recipient",
    "no such user",
    "mailbox unavailable",
    "does not exist",
    "authentication",
    "unauthorized",
    "forbidden",
];

/// Classify a transport failure string
///
/// A leading SMTP reply code decides first (4xx retryable, 5xx permanent).
/// Otherwise wording about rejected recipients or credentials is permanent
/// and everything else is retried within the attempt bound.
pub fn classify_failure(error: &str) -> FailureClass {
    let trimmed = error.trim_start();
    let code: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    if code.len() == 3 {
        match code.as_bytes()[0] {
            b'4' => return FailureClass::Retryable,
            b'5' => return FailureClass::Permanent,
            _ => {}
        }
    }

    let lower = error.to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        FailureClass::Permanent
    } else {
        FailureClass::Retryable
    }
}

/// Transport that only logs messages
///
/// Used when no mail service is configured.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), String> {
        info!(
            to = %message.to,
            subject = %message.subject,
            key = %message.idempotency_key,
            attachments = message.attachments.len(),
            "Report email (log transport, not sent)"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_codes_decide_first() {
        assert_eq!(classify_failure("421 service not available"), FailureClass::Retryable);
        assert_eq!(classify_failure("450 mailbox busy, try again"), FailureClass::Retryable);
        assert_eq!(classify_failure("550 5.1.1 user unknown"), FailureClass::Permanent);
        assert_eq!(classify_failure("554 temporary? no"), FailureClass::Permanent);
    }

    #[test]
    fn test_wording() {
        assert_eq!(classify_failure("connection reset by peer"), FailureClass::Retryable);
        assert_eq!(classify_failure("request timed out"), FailureClass::Retryable);
        assert_eq!(classify_failure("Rate limit exceeded"), FailureClass::Retryable);
        assert_eq!(classify_failure("Recipient rejected"), FailureClass::Permanent);
        assert_eq!(classify_failure("authentication failed"), FailureClass::Permanent);
        assert_eq!(classify_failure("something odd"), FailureClass::Retryable);
    }

    #[tokio::test]
    async fn test_log_transport_accepts() {
        let message = MailMessage {
            idempotency_key: "k".to_string(),
            from: "a@example.org".to_string(),
            to: "b@example.org".to_string(),
            subject: "s".to_string(),
            text_body: "t".to_string(),
            html_body: "h".to_string(),
            attachments: vec![],
        };
        assert!(LogTransport.send(&message).await.is_ok());
        assert_eq!(LogTransport.name(), "log");
    }
}

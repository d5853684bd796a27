//! Mail delivery through a JSON HTTP mail API
//!
//! Posts each message to a single endpoint with bearer authentication. The
//! message's idempotency key travels in the `Idempotency-Key` header so the
//! provider can drop duplicates of a retried send.

use async_trait::async_trait;
use serde::Serialize;

use super::error::{DeliveryError, DeliveryResult};
use super::message::MailMessage;
use super::transport::MailTransport;

/// HTTP mail API transport
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    endpoint: String,
    token: String,
    timeout_seconds: u64,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct AttachmentPayload<'a> {
    filename: &'a str,
    content_type: &'a str,
    /// Base64-encoded content
    content: String,
}

impl<'a> MailPayload<'a> {
    fn from_message(message: &'a MailMessage) -> Self {
        Self {
            from: &message.from,
            to: vec![message.to.as_str()],
            subject: &message.subject,
            text: &message.text_body,
            html: &message.html_body,
            attachments: message
                .attachments
                .iter()
                .map(|a| AttachmentPayload {
                    filename: &a.filename,
                    content_type: &a.content_type,
                    content: a.to_base64(),
                })
                .collect(),
        }
    }
}

impl HttpMailTransport {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> DeliveryResult<Self> {
        let endpoint = endpoint.into();
        let token = token.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(DeliveryError::Config(format!(
                "mail API URL must be http(s): {endpoint}"
            )));
        }
        if token.trim().is_empty() {
            return Err(DeliveryError::Config("mail API token is empty".to_string()));
        }
        Ok(Self {
            endpoint,
            token,
            timeout_seconds: 30,
            client: reqwest::Client::new(),
        })
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Describe an HTTP failure in words [`classify_failure`](super::classify_failure) understands
fn status_failure(status: u16, body: &str) -> String {
    match status {
        401 | 403 => format!("HTTP {status}: authentication failed: {body}"),
        408 => format!("HTTP {status}: request timed out"),
        429 => format!("HTTP {status}: rate limit exceeded"),
        // The body is left out so its wording cannot flip the classification
        500..=599 => format!("HTTP {status}: temporary server error"),
        _ => format!("HTTP {status}: message rejected: {body}"),
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), String> {
        let payload = MailPayload::from_message(message);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Idempotency-Key", &message.idempotency_key)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(self.timeout_seconds))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("mail API request timed out after {}s", self.timeout_seconds)
                } else if e.is_connect() {
                    format!("connection to {} failed: {e}", self.endpoint)
                } else {
                    format!("mail API request failed: {e}")
                }
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "Mail API accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = %body.trim(), "Mail API refused message");
        Err(status_failure(status.as_u16(), body.trim()))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::message::Attachment;
    use crate::delivery::transport::{FailureClass, classify_failure};

    #[test]
    fn test_new_validates_config() {
        assert!(HttpMailTransport::new("https://mail.example.org/send", "tok").is_ok());
        assert!(matches!(
            HttpMailTransport::new("mail.example.org", "tok"),
            Err(DeliveryError::Config(_))
        ));
        assert!(matches!(
            HttpMailTransport::new("https://mail.example.org/send", " "),
            Err(DeliveryError::Config(_))
        ));
    }

    #[test]
    fn test_status_failures_classify() {
        assert_eq!(classify_failure(&status_failure(503, "")), FailureClass::Retryable);
        assert_eq!(classify_failure(&status_failure(429, "")), FailureClass::Retryable);
        assert_eq!(classify_failure(&status_failure(401, "")), FailureClass::Permanent);
        assert_eq!(classify_failure(&status_failure(422, "bad to")), FailureClass::Permanent);
    }

    #[test]
    fn test_payload_encodes_attachment() {
        let message = MailMessage {
            idempotency_key: "job-1".to_string(),
            from: "reports@example.org".to_string(),
            to: "ops@example.org".to_string(),
            subject: "Report".to_string(),
            text_body: "Body".to_string(),
            html_body: "<p>Body</p>".to_string(),
            attachments: vec![Attachment::pdf("report.pdf", b"%PDF".to_vec())],
        };
        let json = serde_json::to_value(MailPayload::from_message(&message)).unwrap();
        assert_eq!(json["to"][0], "ops@example.org");
        assert_eq!(json["attachments"][0]["content"], "JVBERg==");
        assert_eq!(json["attachments"][0]["content_type"], "application/pdf");
    }
}

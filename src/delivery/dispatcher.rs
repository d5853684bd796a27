//! Delivery with bounded retries
//!
//! The dispatcher sends one message per [`DeliveryRecord`] and keeps the
//! record current after every attempt. A record that already reached `sent`
//! is never sent again, which makes redelivery after a worker restart safe.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{DeliveryError, DeliveryResult};
use super::message::{MailMessage, validate_address};
use super::transport::{FailureClass, MailTransport, classify_failure};
use crate::llm::{RetryDecision, RetryPolicy};
use crate::models::{DeliveryRecord, DeliveryStatus};

/// Delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Sender address
    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default = "default_retry")]
    pub retry: RetryPolicy,
}

fn default_from() -> String {
    "reports@localhost.localdomain".to_string()
}

fn default_retry() -> RetryPolicy {
    RetryPolicy::default().with_backoff(1_000, 2.0, 30_000)
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            retry: default_retry(),
        }
    }
}

impl DeliveryConfig {
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Sends report messages through a transport
#[derive(Clone)]
pub struct DeliveryDispatcher {
    transport: Arc<dyn MailTransport>,
    config: DeliveryConfig,
}

impl DeliveryDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, config: DeliveryConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Deliver `message`, updating `record` as attempts happen
    ///
    /// Returns without sending when the record is already `sent`.
    pub async fn deliver(
        &self,
        record: &mut DeliveryRecord,
        message: &MailMessage,
    ) -> DeliveryResult<()> {
        match record.status {
            DeliveryStatus::Sent => {
                debug!(job_id = %record.job_id, recipient = %record.recipient, "Already delivered");
                return Ok(());
            }
            DeliveryStatus::Failed => {
                return Err(DeliveryError::AlreadyFailed(record.recipient.clone()));
            }
            DeliveryStatus::Pending => {}
        }

        if let Err(e) = validate_address(&message.to) {
            record.mark_failed(e.to_string());
            return Err(e);
        }

        let mut state = self.config.retry.start();
        loop {
            let attempt = state.start_attempt();
            record.record_attempt(Utc::now());
            debug!(
                attempt,
                transport = self.transport.name(),
                recipient = %message.to,
                "Sending report email"
            );

            let error = match self.transport.send(message).await {
                Ok(()) => {
                    record.mark_sent();
                    info!(
                        job_id = %record.job_id,
                        recipient = %record.recipient,
                        attempts = record.attempt_count,
                        "Report delivered"
                    );
                    return Ok(());
                }
                Err(error) => error,
            };

            if classify_failure(&error) == FailureClass::Permanent {
                warn!(attempt, error = %error, "Permanent delivery failure");
                record.mark_failed(error.clone());
                return Err(DeliveryError::Permanent {
                    recipient: record.recipient.clone(),
                    message: error,
                });
            }

            record.note_error(error.clone());
            match state.on_transient_failure() {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    record.mark_failed(error.clone());
                    return Err(DeliveryError::Exhausted {
                        recipient: record.recipient.clone(),
                        attempts: attempt,
                        last: error,
                    });
                }
            }
        }
    }
}

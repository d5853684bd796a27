//! Delivery tracking for report emails

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status; moves only `Pending -> Sent` or `Pending -> Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Record of delivering one job's report to one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub job_id: Uuid,
    pub recipient: String,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub last_error: Option<String>,
}

impl DeliveryRecord {
    pub fn new(job_id: Uuid, recipient: impl Into<String>) -> Self {
        Self {
            job_id,
            recipient: recipient.into(),
            attempt_count: 0,
            last_attempt_at: None,
            status: DeliveryStatus::Pending,
            last_error: None,
        }
    }

    /// Count a new attempt. Ignored once the record is terminal.
    pub fn record_attempt(&mut self, at: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.attempt_count += 1;
        self.last_attempt_at = Some(at);
    }

    /// Move to `Sent`; returns false if the record was already terminal
    pub fn mark_sent(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = DeliveryStatus::Sent;
        self.last_error = None;
        true
    }

    /// Remember a failed attempt without leaving `Pending`
    pub fn note_error(&mut self, error: impl Into<String>) {
        if !self.is_terminal() {
            self.last_error = Some(error.into());
        }
    }

    /// Move to `Failed`; returns false if the record was already terminal
    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = DeliveryStatus::Failed;
        self.last_error = Some(error.into());
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status != DeliveryStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_monotone() {
        let mut record = DeliveryRecord::new(Uuid::new_v4(), "ops@example.edu");
        record.record_attempt(Utc::now());
        assert!(record.mark_sent());
        assert!(!record.mark_failed("late failure"));
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_attempts_stop_counting_after_terminal() {
        let mut record = DeliveryRecord::new(Uuid::new_v4(), "ops@example.edu");
        record.record_attempt(Utc::now());
        record.note_error("421 try again");
        record.record_attempt(Utc::now());
        assert!(record.mark_failed("550 rejected"));
        record.record_attempt(Utc::now());
        assert_eq!(record.attempt_count, 2);
        assert_eq!(record.last_error.as_deref(), Some("550 rejected"));
    }
}

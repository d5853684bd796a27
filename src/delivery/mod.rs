//! Report delivery by email
//!
//! # Features
//!
//! - **Transport seam**: [`MailTransport`]; [`LogTransport`] for local runs and
//!   [`HttpMailTransport`] for a JSON mail API (requires the `api-backend` feature)
//! - **Bounded retries**: retryable failures back off, permanent ones stop at once
//! - **Idempotent**: a record that reached `sent` is never sent again, and each
//!   message carries the job id as its idempotency key
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use report_pipeline::delivery::{DeliveryConfig, DeliveryDispatcher, LogTransport};
//!
//! let dispatcher = DeliveryDispatcher::new(Arc::new(LogTransport), DeliveryConfig::default());
//! dispatcher.deliver(&mut record, &message).await?;
//! ```

pub mod dispatcher;
pub mod error;
#[cfg(feature = "api-backend")]
pub mod http;
pub mod message;
pub mod template;
pub mod transport;

pub use dispatcher::{DeliveryConfig, DeliveryDispatcher};
pub use error::{DeliveryError, DeliveryResult};
#[cfg(feature = "api-backend")]
pub use http::HttpMailTransport;
pub use message::{Attachment, MailMessage, validate_address};
pub use template::{ReportEmail, escape_html};
pub use transport::{FailureClass, LogTransport, MailTransport, classify_failure};

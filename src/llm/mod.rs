//! AI analysis of normalized tables
//!
//! The analysis stage sends a normalized table (or a digest of it) to a
//! reasoning service and parses a schema-versioned JSON answer into an
//! [`AnalysisResult`](crate::models::AnalysisResult).
//!
//! # Features
//!
//! - **Service seam**: [`AnalysisService`] trait; [`GroqClient`] talks to any
//!   OpenAI-compatible endpoint (requires the `api-backend` feature)
//! - **Payload control**: tables above a row or byte ceiling are replaced by a
//!   deterministic [`TableDigest`]
//! - **Retries**: per-attempt timeout and bounded exponential backoff for
//!   transient failures; fatal and unparseable answers are never retried
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use report_pipeline::llm::{AnalysisClient, AnalysisConfig, GroqClient};
//!
//! let service = GroqClient::new(api_key, "llama3-8b-8192");
//! let client = AnalysisClient::new(Arc::new(service), AnalysisConfig::default());
//! let outcome = client.analyze(&schema, &normalized).await?;
//! println!("{}", outcome.result.summary_text);
//! ```

pub mod analyzer;
pub mod client;
pub mod config;
pub mod digest;
pub mod error;
#[cfg(feature = "api-backend")]
pub mod groq;
pub mod prompt;
pub mod retry;

pub use analyzer::{AnalysisClient, AnalysisOutcome};
pub use client::{AnalysisRequest, AnalysisService, SCHEMA_VERSION};
pub use config::{AnalysisConfig, ServiceSettings};
pub use digest::{AnalysisPayload, DigestConfig, SampleMethod, TableDigest};
pub use error::{AnalysisError, AnalysisOpResult, AttemptFailure, ServiceError, ServiceResult};
#[cfg(feature = "api-backend")]
pub use groq::GroqClient;
pub use prompt::{ParsedAnalysis, ResponseFault, build_prompt, parse_response};
pub use retry::{RetryDecision, RetryPolicy, RetryState};

#[cfg(test)]
pub use client::MockAnalysisService;

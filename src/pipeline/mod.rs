//! Job orchestration for uploaded reports
//!
//! This module runs every upload through the full sequence:
//! - Ingestion of the uploaded file
//! - Validation against the report schema
//! - Normalization (cleanup, currency conversion, derived columns, merging)
//! - AI analysis
//! - Chart rendering and report composition
//! - PDF rendering
//! - Email delivery (skipped when the job has no recipient)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use report_pipeline::pipeline::{PipelineConfig, PipelineContext, PipelineService, UploadRequest};
//!
//! let config = PipelineConfig::load("pipeline.toml")?.with_env();
//! let ctx = PipelineContext::new(&config, catalog, rates, service, transport);
//! let pipeline = PipelineService::new(&config, ctx)?;
//!
//! let id = pipeline.submit(UploadRequest {
//!     file_name: "assets.xlsx".to_string(),
//!     bytes,
//!     kind: None,
//!     report_type: "campus_assets".to_string(),
//!     requesting_user_id: "u-42".to_string(),
//!     recipient: Some("facilities@example.org".to_string()),
//! })?;
//! let view = pipeline.wait(id).await;
//! ```
//!
//! # Job states
//!
//! `created → ingesting → validating → normalizing → analyzing → composing →
//! rendering → delivering → completed`, with `failed` and `cancelled` reachable
//! from any unfinished state. Every finished stage appends a [`StageRecord`].
//!
//! # Resume
//!
//! Each stage stores its artifact on the job. When a worker's lease expires,
//! [`PipelineService::reclaim_expired`] hands the job to a new worker, which
//! skips the stages whose artifacts exist and re-runs the one in flight.

mod config;
mod error;
mod executor;
mod job;
mod service;
mod store;

pub use config::{MailSettings, PipelineConfig};
pub use error::{
    ErrorKind, PipelineError, PipelineResult, StoreError, StoreResult, SubmitError,
};
pub use executor::{JobExecutor, PipelineContext};
pub use job::{
    FileRef, Job, JobArtifacts, JobFailure, JobId, JobStatus, JobStatusView, ResultRef, Stage,
    StageOutcome, StageRecord,
};
pub use service::{PipelineService, UploadRequest};
pub use store::{JobStore, Lease};

//! Error types for pipeline jobs
//!
//! Every stage error converts into [`PipelineError`], which maps onto the
//! user-facing [`ErrorKind`] taxonomy recorded in a job's stage history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::{JobId, JobStatus};
use crate::catalog::CatalogError;
use crate::delivery::DeliveryError;
use crate::export::ExportError;
use crate::import::IngestError;
use crate::llm::AnalysisError;
use crate::normalize::NormalizeError;
use crate::validation::ValidationError;

/// Why a job failed, as reported to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnreadableFile,
    EmptyFile,
    MalformedSchema,
    NoValidData,
    DerivationError,
    RenderError,
    AnalysisTransientError,
    AnalysisFatalError,
    AnalysisParseError,
    DeliveryFailure,
    Internal,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnreadableFile => "unreadable_file",
            Self::EmptyFile => "empty_file",
            Self::MalformedSchema => "malformed_schema",
            Self::NoValidData => "no_valid_data",
            Self::DerivationError => "derivation_error",
            Self::RenderError => "render_error",
            Self::AnalysisTransientError => "analysis_transient_error",
            Self::AnalysisFatalError => "analysis_fatal_error",
            Self::AnalysisParseError => "analysis_parse_error",
            Self::DeliveryFailure => "delivery_failure",
            Self::Internal => "internal",
        }
    }

    /// Kinds caused by broken internal invariants rather than the upload
    ///
    /// Their details stay in the logs; users only see a generic message.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::DerivationError | Self::RenderError | Self::Internal
        )
    }

    /// Message shown for internal kinds
    pub fn generic_message(&self) -> &'static str {
        "The report could not be produced because of an internal error.\n\n\
        Hint: The problem has been logged. Submit the file again later or contact support."
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Job store failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The caller does not hold the job's current lease
    #[error("Lease on job {job_id} is not held by {owner}")]
    LeaseNotHeld { job_id: JobId, owner: String },

    /// Another worker holds an unexpired lease
    #[error("Job {job_id} is leased by {holder}")]
    Leased { job_id: JobId, holder: String },

    #[error("Lease on job {0} expired")]
    LeaseExpired(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {0} is already finished")]
    Finished(JobId),

    #[error("Job {0} is still running")]
    StillActive(JobId),
}

/// Result type for job store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned when an upload is refused before a job exists
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    UnknownReportType(#[from] CatalogError),

    #[error(transparent)]
    Unsupported(#[from] IngestError),

    #[error("Upload is empty")]
    EmptyUpload,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The service is shutting down
    #[error("Pipeline service is not accepting jobs")]
    ShuttingDown,
}

impl SubmitError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::UnknownReportType(e) => e.user_message(),
            SubmitError::Unsupported(e) => e.user_message(),
            SubmitError::EmptyUpload => {
                "The uploaded file is empty.\n\nHint: Choose a file that contains data.".to_string()
            }
            SubmitError::InvalidRequest(msg) => format!("Invalid request: {msg}"),
            SubmitError::ShuttingDown => {
                "The report service is shutting down.\n\nHint: Submit the file again shortly."
                    .to_string()
            }
        }
    }
}

/// Errors that end a pipeline job
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every row failed validation
    #[error("No valid rows: all {total_rows} rows have violations")]
    NoValidData { total_rows: usize, violations: usize },

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A stage ran without the artifact of the stage before it
    #[error("Stage '{stage}' is missing its input: {input}")]
    MissingArtifact { stage: String, input: String },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn missing(stage: impl Into<String>, input: impl Into<String>) -> Self {
        Self::MissingArtifact {
            stage: stage.into(),
            input: input.into(),
        }
    }

    /// Map onto the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Ingest(IngestError::EmptyFile) => ErrorKind::EmptyFile,
            PipelineError::Ingest(_) => ErrorKind::UnreadableFile,
            PipelineError::Validation(_) => ErrorKind::MalformedSchema,
            PipelineError::NoValidData { .. } => ErrorKind::NoValidData,
            PipelineError::Normalize(NormalizeError::Header(_)) => ErrorKind::MalformedSchema,
            PipelineError::Normalize(_) => ErrorKind::DerivationError,
            PipelineError::Analysis(AnalysisError::Transient { .. }) => {
                ErrorKind::AnalysisTransientError
            }
            PipelineError::Analysis(AnalysisError::Fatal { .. }) => ErrorKind::AnalysisFatalError,
            PipelineError::Analysis(AnalysisError::Parse { .. }) => ErrorKind::AnalysisParseError,
            PipelineError::Export(_) => ErrorKind::RenderError,
            PipelineError::Delivery(_) => ErrorKind::DeliveryFailure,
            PipelineError::Catalog(_)
            | PipelineError::Store(_)
            | PipelineError::ConfigError(_)
            | PipelineError::MissingArtifact { .. } => ErrorKind::Internal,
        }
    }

    /// Get a user-friendly error message
    ///
    /// Internal kinds never reveal their details.
    pub fn user_message(&self) -> String {
        let kind = self.kind();
        if kind.is_internal() {
            return kind.generic_message().to_string();
        }
        match self {
            PipelineError::Ingest(e) => e.user_message(),
            PipelineError::Validation(e) => e.user_message(),
            PipelineError::Normalize(NormalizeError::Header(e)) => e.user_message(),
            PipelineError::NoValidData { total_rows, .. } => format!(
                "None of the {total_rows} rows passed validation, so no report was produced.\n\n\
                Hint: Check that required columns are filled in and values have the expected format."
            ),
            PipelineError::Analysis(e) => e.user_message(),
            PipelineError::Delivery(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::FileKind;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PipelineError::from(IngestError::EmptyFile).kind(),
            ErrorKind::EmptyFile
        );
        assert_eq!(
            PipelineError::from(IngestError::UnreadableFile {
                kind: FileKind::Xlsx,
                reason: "not a zip".to_string()
            })
            .kind(),
            ErrorKind::UnreadableFile
        );
        assert_eq!(
            PipelineError::from(NormalizeError::MissingRate {
                currency: "USD".to_string(),
                base: "INR".to_string(),
                version: "2024-05".to_string()
            })
            .kind(),
            ErrorKind::DerivationError
        );
        assert_eq!(
            PipelineError::from(AnalysisError::Parse {
                message: "no summary".to_string(),
                history: vec![]
            })
            .kind(),
            ErrorKind::AnalysisParseError
        );
    }

    #[test]
    fn test_internal_kinds_hide_details() {
        let err = PipelineError::from(NormalizeError::Derivation {
            column: "total_value".to_string(),
            row_index: 4,
            reason: "overflow".to_string(),
        });
        let msg = err.user_message();
        assert!(!msg.contains("total_value"));
        assert!(msg.contains("internal error"));

        let err = PipelineError::from(ExportError::Chart("empty buffer".to_string()));
        assert!(!err.user_message().contains("empty buffer"));
    }

    #[test]
    fn test_user_facing_kinds_keep_hints() {
        let err = PipelineError::NoValidData {
            total_rows: 3,
            violations: 5,
        };
        assert_eq!(err.kind(), ErrorKind::NoValidData);
        assert!(err.user_message().contains("Hint:"));
        assert!(err.user_message().contains("3 rows"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::AnalysisTransientError).unwrap();
        assert_eq!(json, "\"analysis_transient_error\"");
        assert_eq!(ErrorKind::NoValidData.to_string(), "no_valid_data");
    }
}

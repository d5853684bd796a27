//! Jobs, their lifecycle, and the artifacts each stage leaves behind

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::{ErrorKind, StoreError, StoreResult};
use crate::export::PdfOutput;
use crate::import::FileKind;
use crate::models::{
    AnalysisResult, AttemptRecord, DeliveryRecord, DeliveryStatus, NormalizedTable, RawTable,
    ReportDocument,
};
use crate::validation::ValidationReport;

/// Unique job identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job lifecycle state
///
/// Working states follow each other in declaration order. `Failed` and
/// `Cancelled` can be entered from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Ingesting,
    Validating,
    Normalizing,
    Analyzing,
    Composing,
    Rendering,
    Delivering,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Ingesting => 1,
            Self::Validating => 2,
            Self::Normalizing => 3,
            Self::Analyzing => 4,
            Self::Composing => 5,
            Self::Rendering => 6,
            Self::Delivering => 7,
            Self::Completed | Self::Failed | Self::Cancelled => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Forward moves only; nothing leaves a terminal state
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Cancelled => true,
            _ => next.rank() > self.rank(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Ingesting => "ingesting",
            Self::Validating => "validating",
            Self::Normalizing => "normalizing",
            Self::Analyzing => "analyzing",
            Self::Composing => "composing",
            Self::Rendering => "rendering",
            Self::Delivering => "delivering",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "ingesting")]
    Ingest,
    #[serde(rename = "validating")]
    Validate,
    #[serde(rename = "normalizing")]
    Normalize,
    #[serde(rename = "analyzing")]
    Analyze,
    #[serde(rename = "composing")]
    Compose,
    #[serde(rename = "rendering")]
    Render,
    #[serde(rename = "delivering")]
    Deliver,
}

impl Stage {
    /// Get all stages in execution order
    pub fn all() -> [Self; 7] {
        [
            Self::Ingest,
            Self::Validate,
            Self::Normalize,
            Self::Analyze,
            Self::Compose,
            Self::Render,
            Self::Deliver,
        ]
    }

    /// Job status while this stage runs
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Ingest => JobStatus::Ingesting,
            Self::Validate => JobStatus::Validating,
            Self::Normalize => JobStatus::Normalizing,
            Self::Analyze => JobStatus::Analyzing,
            Self::Compose => JobStatus::Composing,
            Self::Render => JobStatus::Rendering,
            Self::Deliver => JobStatus::Delivering,
        }
    }

    pub fn name(&self) -> &'static str {
        self.status().name()
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Ingest => "Parse the upload into a raw table",
            Self::Validate => "Check rows against the report schema",
            Self::Normalize => "Clean, convert and merge valid rows",
            Self::Analyze => "Request the AI analysis",
            Self::Compose => "Render charts and compose the report",
            Self::Render => "Write the PDF",
            Self::Deliver => "Email the report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How a stage ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Skipped { reason: String },
    Failed { error_kind: ErrorKind, message: String },
    Cancelled,
}

/// One finished stage in a job's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    /// Strictly increasing within one job
    pub timestamp: DateTime<Utc>,
    /// Service attempts made by the stage, when it calls one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
    pub duration_ms: u64,
}

/// Reference to the uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_name: String,
    pub kind: FileKind,
    pub size_bytes: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
}

impl FileRef {
    pub fn describe(file_name: impl Into<String>, kind: FileKind, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            kind,
            size_bytes: bytes.len() as u64,
            sha256: sha256_hex(bytes),
        }
    }
}

/// Reference to the rendered PDF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub file_name: String,
    pub page_count: u32,
    pub size_bytes: u64,
    pub sha256: String,
}

impl ResultRef {
    pub fn for_pdf(pdf: &PdfOutput) -> Self {
        Self {
            file_name: pdf.filename(),
            page_count: pdf.page_count,
            size_bytes: pdf.bytes.len() as u64,
            sha256: sha256_hex(&pdf.bytes),
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Failure attached to a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    /// Safe to show to the requesting user
    pub message: String,
    /// Full error text, for logs and operators
    #[serde(skip)]
    pub detail: String,
}

/// Everything a job has produced so far
///
/// A stage whose artifact is present is not run again when the job resumes.
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    pub upload: Arc<Vec<u8>>,
    pub raw: Option<Arc<RawTable>>,
    pub validation: Option<Arc<ValidationReport>>,
    pub normalized: Option<Arc<NormalizedTable>>,
    pub analysis: Option<Arc<AnalysisResult>>,
    pub document: Option<Arc<ReportDocument>>,
    pub pdf: Option<Arc<PdfOutput>>,
    pub delivery: Option<DeliveryRecord>,
}

impl JobArtifacts {
    pub fn new(upload: Vec<u8>) -> Self {
        Self {
            upload: Arc::new(upload),
            raw: None,
            validation: None,
            normalized: None,
            analysis: None,
            document: None,
            pdf: None,
            delivery: None,
        }
    }

    /// Has `stage` already produced its output?
    pub fn has(&self, stage: Stage) -> bool {
        match stage {
            Stage::Ingest => self.raw.is_some(),
            Stage::Validate => self.validation.is_some(),
            Stage::Normalize => self.normalized.is_some(),
            Stage::Analyze => self.analysis.is_some(),
            Stage::Compose => self.document.is_some(),
            Stage::Render => self.pdf.is_some(),
            Stage::Deliver => self
                .delivery
                .as_ref()
                .is_some_and(|d| d.status == DeliveryStatus::Sent),
        }
    }
}

/// A report job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub report_type: String,
    pub uploaded_file_ref: FileRef,
    pub requesting_user_id: String,
    pub recipient: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stage_history: Vec<StageRecord>,
    pub result_ref: Option<ResultRef>,
    pub error: Option<JobFailure>,
    pub artifacts: JobArtifacts,
    /// Set by a cancel request; honored at the next stage boundary
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(
        report_type: impl Into<String>,
        uploaded_file_ref: FileRef,
        upload: Vec<u8>,
        requesting_user_id: impl Into<String>,
        recipient: Option<String>,
    ) -> Self {
        Self {
            id: JobId::new(),
            report_type: report_type.into(),
            uploaded_file_ref,
            requesting_user_id: requesting_user_id.into(),
            recipient,
            status: JobStatus::Created,
            created_at: Utc::now(),
            finished_at: None,
            stage_history: Vec::new(),
            result_ref: None,
            error: None,
            artifacts: JobArtifacts::new(upload),
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `next`, refusing backward moves and moves out of terminal states
    pub fn transition(&mut self, next: JobStatus) -> StoreResult<()> {
        if self.status == next && !next.is_terminal() {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Append a stage record, keeping timestamps strictly increasing
    pub fn record_stage(
        &mut self,
        stage: Stage,
        outcome: StageOutcome,
        attempts: Vec<AttemptRecord>,
        duration_ms: u64,
    ) -> &StageRecord {
        let mut timestamp = Utc::now();
        if let Some(last) = self.stage_history.last()
            && timestamp <= last.timestamp
        {
            timestamp = last.timestamp + chrono::Duration::microseconds(1);
        }
        self.stage_history.push(StageRecord {
            stage,
            outcome,
            timestamp,
            attempts,
            duration_ms,
        });
        &self.stage_history[self.stage_history.len() - 1]
    }

    /// Record a failure and move to `Failed`
    pub fn fail(&mut self, failure: JobFailure) -> StoreResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            id: self.id,
            report_type: self.report_type.clone(),
            status: self.status,
            created_at: self.created_at,
            finished_at: self.finished_at,
            stage_history: self.stage_history.clone(),
            result_ref: self.result_ref.clone(),
            error_kind: self.error.as_ref().map(|e| e.kind),
            error_message: self.error.as_ref().map(|e| e.message.clone()),
            delivery_status: self.artifacts.delivery.as_ref().map(|d| d.status),
        }
    }
}

/// Status of a job as shown to its requester
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub report_type: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stage_history: Vec<StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<ResultRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        let bytes = b"a,b\n1,2\n".to_vec();
        let file = FileRef::describe("assets.csv", FileKind::Csv, &bytes);
        Job::new("campus_assets", file, bytes, "user-1", None)
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Created.can_transition_to(Ingesting));
        assert!(Ingesting.can_transition_to(Analyzing));
        assert!(!Analyzing.can_transition_to(Validating));
        assert!(Rendering.can_transition_to(Failed));
        assert!(Created.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Cancelled.can_transition_to(Ingesting));
        assert!(!Failed.can_transition_to(Cancelled));
    }

    #[test]
    fn test_job_refuses_backward_moves() {
        let mut job = job();
        job.transition(JobStatus::Validating).unwrap();
        let err = job.transition(JobStatus::Ingesting).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(job.status, JobStatus::Validating);
    }

    #[test]
    fn test_terminal_sets_finished_at() {
        let mut job = job();
        assert!(job.finished_at.is_none());
        job.transition(JobStatus::Cancelled).unwrap();
        assert!(job.finished_at.is_some());
        assert!(job.transition(JobStatus::Cancelled).is_err());
    }

    #[test]
    fn test_record_timestamps_strictly_increase() {
        let mut job = job();
        for stage in Stage::all() {
            job.record_stage(stage, StageOutcome::Completed, vec![], 0);
        }
        assert_eq!(job.stage_history.len(), 7);
        for pair in job.stage_history.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_file_ref_hashes_content() {
        let file = FileRef::describe("x.csv", FileKind::Csv, b"abc");
        assert_eq!(file.size_bytes, 3);
        assert_eq!(
            file.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_stage_record_serializes_flat() {
        let mut job = job();
        job.record_stage(
            Stage::Analyze,
            StageOutcome::Failed {
                error_kind: ErrorKind::AnalysisFatalError,
                message: "rejected".to_string(),
            },
            vec![],
            12,
        );
        let json = serde_json::to_value(&job.stage_history[0]).unwrap();
        assert_eq!(json["stage"], "analyzing");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["error_kind"], "analysis_fatal_error");
        assert!(json.get("attempts").is_none());
    }

    #[test]
    fn test_view_hides_failure_detail() {
        let mut job = job();
        job.fail(JobFailure {
            kind: ErrorKind::Internal,
            message: "generic".to_string(),
            detail: "lease lost".to_string(),
        })
        .unwrap();
        let json = serde_json::to_string(&job.view()).unwrap();
        assert!(json.contains("generic"));
        assert!(!json.contains("lease lost"));
    }
}

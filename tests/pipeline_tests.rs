//! End-to-end job runs through the pipeline service

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use report_pipeline::catalog::SchemaCatalog;
use report_pipeline::delivery::{DeliveryConfig, MailMessage, MailTransport};
use report_pipeline::llm::{
    AnalysisConfig, AnalysisRequest, AnalysisService, RetryPolicy, ServiceError, ServiceResult,
};
use report_pipeline::models::DeliveryStatus;
use report_pipeline::normalize::ExchangeRateTable;
use report_pipeline::pipeline::{
    ErrorKind, Job, JobId, JobStatus, JobStatusView, PipelineConfig, PipelineContext,
    PipelineService, Stage, StageOutcome, UploadRequest,
};
use report_pipeline::validation::Rule;

const ANSWER: &str = r#"{
    "schema_version": "1",
    "summary": "Projectors in Lab 1 hold most of the inventory value.",
    "key_findings": ["Two projectors account for 98% of value"],
    "metrics": {"total_value": 91700.0, "locations": 2},
    "confidence": 0.82
}"#;

const CSV: &str = "Sl No,Device,Qty,Description,Purchase Date,Room,Price,Dept\n\
    1,Projector,2,Epson EB-X41,2023-04-01,Lab 1,45000,cse\n\
    2,Mouse,2,Logitech M90,2023-06-15,Lab 2,850,ece\n";

/// Answers with each scripted reply in turn, optionally after a delay
struct ScriptedAnalysis {
    replies: Mutex<VecDeque<ServiceResult<String>>>,
    delay: Duration,
    calls: Mutex<usize>,
}

impl ScriptedAnalysis {
    fn new(replies: Vec<ServiceResult<String>>) -> Arc<Self> {
        Self::slow(replies, Duration::ZERO)
    }

    fn slow(replies: Vec<ServiceResult<String>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay,
            calls: Mutex::new(0),
        })
    }
}

#[async_trait]
impl AnalysisService for ScriptedAnalysis {
    async fn analyze(&self, _request: &AnalysisRequest) -> ServiceResult<String> {
        *self.calls.lock().unwrap() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ANSWER.to_string()))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Records sent messages and fails with the queued errors first
#[derive(Default)]
struct RecordingTransport {
    failures: Mutex<VecDeque<String>>,
    sent: Mutex<Vec<MailMessage>>,
    calls: Mutex<usize>,
}

impl RecordingTransport {
    fn failing_with(failures: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(failures.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), String> {
        *self.calls.lock().unwrap() += 1;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_analysis(
            AnalysisConfig::default()
                .with_attempt_timeout_ms(2_000)
                .with_retry(RetryPolicy::immediate(3)),
        )
        .with_delivery(DeliveryConfig::default().with_retry(RetryPolicy::immediate(3)))
}

fn service(
    config: PipelineConfig,
    analysis: Arc<dyn AnalysisService>,
    transport: Arc<dyn MailTransport>,
) -> PipelineService {
    let ctx = PipelineContext::new(
        &config,
        Arc::new(SchemaCatalog::builtin().unwrap()),
        Arc::new(ExchangeRateTable::identity("INR")),
        analysis,
        transport,
    );
    PipelineService::new(&config, ctx).unwrap()
}

fn upload(csv: &str, recipient: Option<&str>) -> UploadRequest {
    UploadRequest {
        file_name: "assets.csv".to_string(),
        bytes: csv.as_bytes().to_vec(),
        kind: None,
        report_type: "campus_assets".to_string(),
        requesting_user_id: "staff-7".to_string(),
        recipient: recipient.map(str::to_string),
    }
}

async fn run(service: &PipelineService, request: UploadRequest) -> (JobId, JobStatusView) {
    let id = service.submit(request).unwrap();
    let view = tokio::time::timeout(Duration::from_secs(30), service.wait(id))
        .await
        .unwrap()
        .unwrap();
    (id, view)
}

fn assert_history_ordered(view: &JobStatusView) {
    let stages: Vec<Stage> = view.stage_history.iter().map(|r| r.stage).collect();
    let mut expected: Vec<Stage> = Stage::all().to_vec();
    expected.truncate(stages.len());
    assert_eq!(stages, expected);
    for pair in view.stage_history.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp);
    }
}

mod completion_tests {
    use super::*;

    #[tokio::test]
    async fn test_report_is_built_and_delivered() {
        let transport = Arc::new(RecordingTransport::default());
        let service = service(config(), ScriptedAnalysis::new(vec![]), transport.clone());
        let (id, view) = run(&service, upload(CSV, Some("facilities@campus.example.org"))).await;

        assert_eq!(view.status, JobStatus::Completed, "{view:?}");
        assert_eq!(view.stage_history.len(), 7);
        assert_history_ordered(&view);
        assert!(view.finished_at.is_some());
        assert_eq!(view.delivery_status, Some(DeliveryStatus::Sent));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "facilities@campus.example.org");
        assert_eq!(sent[0].attachments.len(), 1);
        assert!(sent[0].attachments[0].bytes.starts_with(b"%PDF-"));

        let result = view.result_ref.unwrap();
        assert_eq!(result.size_bytes as usize, sent[0].attachments[0].bytes.len());

        let job = service.store().get(id).unwrap();
        assert_eq!(job.artifacts.normalized.as_ref().unwrap().row_count(), 2);
        let analysis = job.artifacts.analysis.as_ref().unwrap();
        assert!(analysis.summary_text.contains("Projectors"));
    }

    #[tokio::test]
    async fn test_pdf_can_be_written_to_disk() {
        let service = service(
            config(),
            ScriptedAnalysis::new(vec![]),
            Arc::new(RecordingTransport::default()),
        );
        let (id, view) = run(&service, upload(CSV, None)).await;
        assert_eq!(view.status, JobStatus::Completed);

        let job = service.store().get(id).unwrap();
        let pdf = job.artifacts.pdf.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(pdf.filename());
        std::fs::write(&path, &pdf.bytes).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert!(written.starts_with(b"%PDF-"));
        assert_eq!(written.len() as u64, view.result_ref.unwrap().size_bytes);
    }

    #[tokio::test]
    async fn test_analysis_recovers_after_two_timeouts() {
        let analysis = ScriptedAnalysis::new(vec![
            Err(ServiceError::Timeout(30)),
            Err(ServiceError::Timeout(30)),
            Ok(ANSWER.to_string()),
        ]);
        let service = service(config(), analysis, Arc::new(RecordingTransport::default()));
        let (_, view) = run(&service, upload(CSV, None)).await;

        assert_eq!(view.status, JobStatus::Completed);
        let analyzing: Vec<_> = view
            .stage_history
            .iter()
            .filter(|r| r.stage == Stage::Analyze)
            .collect();
        assert_eq!(analyzing.len(), 1);
        assert_eq!(analyzing[0].attempts.len(), 3);
        assert!(analyzing[0].attempts[2].is_success());
    }

    #[tokio::test]
    async fn test_unconvertible_currency_row_is_reported() {
        let csv = "Device,Qty,Description,Purchase Date,Room,Price\n\
            Projector,2,Epson EB-X41,2023-04-01,Lab 1,45000\n\
            Router,1,TP-Link Archer,2023-07-02,Lab 2,$850\n";
        let service = service(
            config(),
            ScriptedAnalysis::new(vec![]),
            Arc::new(RecordingTransport::default()),
        );
        let (id, view) = run(&service, upload(csv, None)).await;

        assert_eq!(view.status, JobStatus::Completed, "{view:?}");
        let job = service.store().get(id).unwrap();
        let validation = job.artifacts.validation.as_ref().unwrap();
        assert_eq!(validation.violations.len(), 1);
        assert_eq!(validation.violations[0].row_index, 1);
        assert_eq!(validation.violations[0].rule, Rule::Currency);
        assert_eq!(job.artifacts.normalized.as_ref().unwrap().row_count(), 1);
    }

    #[tokio::test]
    async fn test_analysis_longer_than_lease_ttl() {
        let analysis = ScriptedAnalysis::slow(vec![], Duration::from_millis(1_500));
        let service = service(
            config().with_lease_ttl_seconds(1),
            analysis,
            Arc::new(RecordingTransport::default()),
        );
        let (_, view) = run(&service, upload(CSV, None)).await;

        assert_eq!(view.status, JobStatus::Completed, "{view:?}");
        assert_history_ordered(&view);
        assert!(service.reclaim_expired().is_empty());
    }

    #[tokio::test]
    async fn test_identical_upload_joins_running_job() {
        let analysis = ScriptedAnalysis::slow(vec![], Duration::from_millis(200));
        let service = service(config(), analysis, Arc::new(RecordingTransport::default()));

        let first = service.submit(upload(CSV, None)).unwrap();
        let second = service.submit(upload(CSV, None)).unwrap();
        assert_eq!(first, second);
        assert_eq!(service.store().len(), 1);

        let view = service.wait(first).await.unwrap();
        assert_eq!(view.status, JobStatus::Completed);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_no_valid_rows() {
        let csv = "Device,Qty,Description,Purchase Date,Room,Price\n\
            Projector,2,Epson,2023-04-01,Lab 1,\n\
            Mouse,-1,Logitech,2023-06-15,Lab 2,850\n";
        let service = service(
            config(),
            ScriptedAnalysis::new(vec![]),
            Arc::new(RecordingTransport::default()),
        );
        let (_, view) = run(&service, upload(csv, None)).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error_kind, Some(ErrorKind::NoValidData));
        let last = view.stage_history.last().unwrap();
        assert_eq!(last.stage, Stage::Validate);
        assert!(matches!(last.outcome, StageOutcome::Failed { .. }));
        assert!(view.result_ref.is_none());
    }

    #[tokio::test]
    async fn test_fatal_analysis_is_tried_once() {
        let analysis = ScriptedAnalysis::new(vec![Err(ServiceError::Auth("revoked".to_string()))]);
        let service = service(config(), analysis, Arc::new(RecordingTransport::default()));
        let (_, view) = run(&service, upload(CSV, None)).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error_kind, Some(ErrorKind::AnalysisFatalError));
        let last = view.stage_history.last().unwrap();
        assert_eq!(last.stage, Stage::Analyze);
        assert_eq!(last.attempts.len(), 1);
        assert_history_ordered(&view);
    }

    #[tokio::test]
    async fn test_empty_file_kind() {
        let service = service(
            config(),
            ScriptedAnalysis::new(vec![]),
            Arc::new(RecordingTransport::default()),
        );
        let (_, view) = run(&service, upload("   \n", None)).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error_kind, Some(ErrorKind::EmptyFile));
        assert_eq!(view.stage_history.len(), 1);
    }
}

mod delivery_tests {
    use super::*;

    #[tokio::test]
    async fn test_transient_delivery_failure_is_retried() {
        let transport = RecordingTransport::failing_with(&["421 service not available"]);
        let service = service(config(), ScriptedAnalysis::new(vec![]), transport.clone());
        let (id, view) = run(&service, upload(CSV, Some("ops@campus.example.org"))).await;

        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.delivery_status, Some(DeliveryStatus::Sent));
        assert_eq!(*transport.calls.lock().unwrap(), 2);

        let job = service.store().get(id).unwrap();
        assert_eq!(job.artifacts.delivery.unwrap().attempt_count, 2);
    }

    #[tokio::test]
    async fn test_permanent_delivery_failure() {
        let transport = RecordingTransport::failing_with(&["550 mailbox unavailable"]);
        let service = service(config(), ScriptedAnalysis::new(vec![]), transport.clone());
        let (_, view) = run(&service, upload(CSV, Some("gone@campus.example.org"))).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error_kind, Some(ErrorKind::DeliveryFailure));
        assert_eq!(view.delivery_status, Some(DeliveryStatus::Failed));
        assert_eq!(*transport.calls.lock().unwrap(), 1);
        // the rendered report stays available
        assert!(view.result_ref.is_some());
    }
}

mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_stops_at_next_stage() {
        let analysis = ScriptedAnalysis::slow(vec![], Duration::from_millis(300));
        let service = service(config(), analysis, Arc::new(RecordingTransport::default()));
        let id = service.submit(upload(CSV, None)).unwrap();

        let mut status = JobStatus::Created;
        for _ in 0..200 {
            status = service.status(id).unwrap().status;
            if status == JobStatus::Analyzing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status, JobStatus::Analyzing);
        assert!(service.cancel(id).unwrap());

        let view = service.wait(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Cancelled);
        let last = view.stage_history.last().unwrap();
        assert_eq!(last.stage, Stage::Compose);
        assert_eq!(last.outcome, StageOutcome::Cancelled);
        assert!(
            view.stage_history
                .iter()
                .all(|r| r.stage != Stage::Render && r.stage != Stage::Deliver)
        );
        assert!(view.result_ref.is_none());
        assert!(!service.cancel(id).unwrap());
    }
}

mod resume_tests {
    use super::*;
    use chrono::Utc;

    /// A copy of a finished job as a worker left it after finishing `done`
    fn interrupted(finished: &Job, done: &[Stage], status: JobStatus) -> Job {
        let mut job = Job::new(
            finished.report_type.clone(),
            finished.uploaded_file_ref.clone(),
            finished.artifacts.upload.to_vec(),
            finished.requesting_user_id.clone(),
            finished.recipient.clone(),
        );
        let from = &finished.artifacts;
        let to = &mut job.artifacts;
        for stage in done {
            match stage {
                Stage::Ingest => to.raw = from.raw.clone(),
                Stage::Validate => to.validation = from.validation.clone(),
                Stage::Normalize => to.normalized = from.normalized.clone(),
                Stage::Analyze => to.analysis = from.analysis.clone(),
                Stage::Compose => to.document = from.document.clone(),
                Stage::Render => {
                    to.pdf = from.pdf.clone();
                    job.result_ref = finished.result_ref.clone();
                }
                Stage::Deliver => to.delivery = from.delivery.clone(),
            }
        }
        job.stage_history = finished
            .stage_history
            .iter()
            .filter(|r| done.contains(&r.stage))
            .cloned()
            .collect();
        job.status = status;
        job
    }

    /// Run one job to the end, then plant an interrupted copy held by a lost worker
    async fn lost_worker(
        done: &[Stage],
        stage_records: usize,
        status: JobStatus,
    ) -> (PipelineService, Arc<ScriptedAnalysis>, Arc<RecordingTransport>, JobId) {
        let analysis = ScriptedAnalysis::new(vec![]);
        let transport = Arc::new(RecordingTransport::default());
        let service = service(
            config().with_lease_ttl_seconds(1),
            analysis.clone(),
            transport.clone(),
        );
        let (first, view) = run(&service, upload(CSV, Some("ops@campus.example.org"))).await;
        assert_eq!(view.status, JobStatus::Completed, "{view:?}");

        let finished = service.store().get(first).unwrap();
        let mut job = interrupted(&finished, done, status);
        job.stage_history.truncate(stage_records);
        let id = service.store().insert(job);
        let lost = service.store().acquire(id, "worker-lost").unwrap();
        assert!(service.reclaim_expired().is_empty());

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(lost.is_expired(Utc::now()));
        (service, analysis, transport, id)
    }

    #[tokio::test]
    async fn test_reclaimed_job_skips_finished_stages() {
        let done = [Stage::Ingest, Stage::Validate, Stage::Normalize, Stage::Analyze];
        let (service, analysis, transport, id) =
            lost_worker(&done, 4, JobStatus::Composing).await;

        assert_eq!(service.reclaim_expired(), vec![id]);
        let view = tokio::time::timeout(Duration::from_secs(30), service.wait(id))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(view.status, JobStatus::Completed, "{view:?}");
        assert_eq!(view.stage_history.len(), 7);
        assert_history_ordered(&view);
        // only the first run reached the analysis service
        assert_eq!(*analysis.calls.lock().unwrap(), 1);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert!(view.result_ref.is_some());
    }

    #[tokio::test]
    async fn test_sent_delivery_is_not_sent_again() {
        // The worker stopped after the send was stored but before Deliver was recorded
        let (service, analysis, transport, id) =
            lost_worker(&Stage::all(), 6, JobStatus::Delivering).await;
        assert_eq!(
            service.store().get(id).unwrap().artifacts.delivery.unwrap().status,
            DeliveryStatus::Sent
        );

        assert_eq!(service.reclaim_expired(), vec![id]);
        let view = tokio::time::timeout(Duration::from_secs(30), service.wait(id))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(view.status, JobStatus::Completed, "{view:?}");
        assert_eq!(view.delivery_status, Some(DeliveryStatus::Sent));
        assert_eq!(*transport.calls.lock().unwrap(), 1);
        assert_eq!(*analysis.calls.lock().unwrap(), 1);
        let last = view.stage_history.last().unwrap();
        assert_eq!(last.stage, Stage::Deliver);
        assert_eq!(last.outcome, StageOutcome::Completed);
        assert_eq!(view.stage_history.len(), 7);
    }
}

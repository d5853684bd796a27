//! Job executor for running one job through every stage

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult, StoreError, StoreResult};
use super::job::{Job, JobFailure, JobId, JobStatus, ResultRef, Stage, StageOutcome};
use super::store::{JobStore, Lease};
use crate::catalog::{ReportSchema, SchemaCatalog};
use crate::delivery::{Attachment, DeliveryDispatcher, MailTransport, ReportEmail};
use crate::export::{ChartRenderer, ComposeConfig, PdfEmitter, PdfOutput, ReportComposer};
use crate::import::FileIngestor;
use crate::llm::{AnalysisClient, AnalysisService};
use crate::models::{
    AnalysisResult, AttemptRecord, DeliveryRecord, NormalizedTable, RawTable, ReportDocument,
};
use crate::normalize::{DataNormalizer, ExchangeRateTable};
use crate::validation::{SchemaValidator, ValidationReport};

/// Shared, read-only collaborators of every job
pub struct PipelineContext {
    pub catalog: Arc<SchemaCatalog>,
    pub rates: Arc<ExchangeRateTable>,
    pub ingestor: FileIngestor,
    pub analysis: AnalysisClient,
    pub charts: ChartRenderer,
    pub compose: ComposeConfig,
    pub pdf: PdfEmitter,
    pub delivery: DeliveryDispatcher,
}

impl PipelineContext {
    pub fn new(
        config: &PipelineConfig,
        catalog: Arc<SchemaCatalog>,
        rates: Arc<ExchangeRateTable>,
        service: Arc<dyn AnalysisService>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            catalog,
            rates,
            ingestor: FileIngestor::new().with_max_bytes(config.max_upload_bytes),
            analysis: AnalysisClient::new(service, config.analysis.clone()),
            charts: ChartRenderer::new(config.chart.clone()),
            compose: config.compose.clone(),
            pdf: PdfEmitter::with_branding(config.branding.clone()),
            delivery: DeliveryDispatcher::new(transport, config.delivery.clone()),
        }
    }
}

/// What a stage leaves on the job
enum Artifact {
    Raw(RawTable),
    Validation(ValidationReport),
    Normalized(NormalizedTable),
    Analysis(AnalysisResult),
    Document(ReportDocument),
    Pdf(PdfOutput),
    Delivered(DeliveryRecord),
}

struct StageOutput {
    artifact: Artifact,
    attempts: Vec<AttemptRecord>,
}

impl StageOutput {
    fn new(artifact: Artifact) -> Self {
        Self {
            artifact,
            attempts: Vec::new(),
        }
    }
}

fn keep(job: &mut Job, artifact: Artifact) {
    let artifacts = &mut job.artifacts;
    match artifact {
        Artifact::Raw(raw) => artifacts.raw = Some(Arc::new(raw)),
        Artifact::Validation(report) => artifacts.validation = Some(Arc::new(report)),
        Artifact::Normalized(table) => artifacts.normalized = Some(Arc::new(table)),
        Artifact::Analysis(result) => artifacts.analysis = Some(Arc::new(result)),
        Artifact::Document(doc) => artifacts.document = Some(Arc::new(doc)),
        Artifact::Pdf(pdf) => {
            job.result_ref = Some(ResultRef::for_pdf(&pdf));
            artifacts.pdf = Some(Arc::new(pdf));
        }
        Artifact::Delivered(record) => artifacts.delivery = Some(record),
    }
}

/// Fetch the artifact an earlier stage stored
fn input<'a, T>(artifact: &'a Option<Arc<T>>, stage: Stage, name: &str) -> PipelineResult<&'a T> {
    artifact
        .as_deref()
        .ok_or_else(|| PipelineError::missing(stage.name(), name))
}

/// Runs jobs from a [`JobStore`] under a lease
///
/// Stages whose artifact is already on the job are skipped, so a job taken
/// over from a lost worker resumes with the stage that was in flight.
pub struct JobExecutor {
    ctx: Arc<PipelineContext>,
    store: Arc<JobStore>,
    worker: String,
}

impl JobExecutor {
    pub fn new(ctx: Arc<PipelineContext>, store: Arc<JobStore>, worker: impl Into<String>) -> Self {
        Self {
            ctx,
            store,
            worker: worker.into(),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Run a job until it completes, fails or is cancelled
    ///
    /// Stage failures end the job and are returned as `Ok(JobStatus::Failed)`.
    /// `Err` means the executor could not work on the job at all, for example
    /// because another worker holds it or the lease was lost.
    pub async fn run(&self, id: JobId) -> PipelineResult<JobStatus> {
        let span = info_span!("pipeline_job", job_id = %id, worker = %self.worker);
        async {
            let mut lease = self.store.acquire(id, &self.worker)?;
            let result = self.drive(id, &mut lease).await;
            if let Err(e) = self.store.release(id, &lease) {
                debug!(error = %e, "Lease release failed");
            }
            if let Err(e) = &result {
                warn!(error = %e, "Job interrupted");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, id: JobId, lease: &mut Lease) -> PipelineResult<JobStatus> {
        let started = Instant::now();
        let job = self.store.get(id).ok_or(StoreError::NotFound(id))?;
        info!(
            report_type = %job.report_type,
            file = %job.uploaded_file_ref.file_name,
            resumed = !job.stage_history.is_empty(),
            "Starting job"
        );

        for stage in Stage::all() {
            let job = self.store.get(id).ok_or(StoreError::NotFound(id))?;

            if job.artifacts.has(stage) {
                debug!(stage = stage.name(), "Stage already completed, skipping");
                // A worker can stop between storing an artifact and recording its stage
                if !job.stage_history.iter().any(|r| r.stage == stage) {
                    self.store.update(id, lease, |job| {
                        job.record_stage(stage, StageOutcome::Completed, Vec::new(), 0);
                    })?;
                }
                continue;
            }

            if job.cancel_requested {
                info!(stage = stage.name(), "Job cancelled");
                self.store.update(id, lease, |job| {
                    job.record_stage(stage, StageOutcome::Cancelled, Vec::new(), 0);
                    job.transition(JobStatus::Cancelled)
                })??;
                return Ok(JobStatus::Cancelled);
            }

            *lease = self.store.renew(id, lease)?;
            self.store
                .update(id, lease, |job| job.transition(stage.status()))??;

            if stage == Stage::Deliver && job.recipient.is_none() {
                debug!("No recipient, skipping delivery");
                self.store.update(id, lease, |job| {
                    job.record_stage(
                        stage,
                        StageOutcome::Skipped {
                            reason: "no recipient".to_string(),
                        },
                        Vec::new(),
                        0,
                    );
                })?;
                continue;
            }

            let stage_started = Instant::now();
            let work = self
                .run_stage(stage, &job, lease)
                .instrument(info_span!("pipeline_stage", stage = stage.name()));
            let result = self.with_heartbeat(id, lease, work).await?;
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    info!(stage = stage.name(), duration_ms, "Stage completed");
                    self.store.update(id, lease, |job| {
                        keep(job, output.artifact);
                        job.record_stage(stage, StageOutcome::Completed, output.attempts, duration_ms);
                    })?;
                }
                Err(err) => {
                    let kind = err.kind();
                    error!(
                        stage = stage.name(),
                        error_kind = %kind,
                        error = %err,
                        "Stage failed"
                    );
                    let attempts = match &err {
                        PipelineError::Analysis(e) => e.history().to_vec(),
                        _ => Vec::new(),
                    };
                    let message = err.user_message();
                    self.store.update(id, lease, |job| {
                        job.record_stage(
                            stage,
                            StageOutcome::Failed {
                                error_kind: kind,
                                message: message.clone(),
                            },
                            attempts,
                            duration_ms,
                        );
                        job.fail(JobFailure {
                            kind,
                            message,
                            detail: err.to_string(),
                        })
                    })??;
                    return Ok(JobStatus::Failed);
                }
            }
        }

        self.store
            .update(id, lease, |job| job.transition(JobStatus::Completed))??;
        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Job completed"
        );
        Ok(JobStatus::Completed)
    }

    /// Await `work` while renewing the lease every heartbeat
    ///
    /// Fails as soon as a renewal does; the stage's own result is dropped then.
    async fn with_heartbeat<F: Future>(
        &self,
        id: JobId,
        lease: &Lease,
        work: F,
    ) -> StoreResult<F::Output> {
        let mut heartbeat = tokio::time::interval(self.store.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick is immediate
        heartbeat.tick().await;
        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return Ok(output),
                _ = heartbeat.tick() => {
                    self.store.renew(id, lease)?;
                }
            }
        }
    }

    async fn run_stage(&self, stage: Stage, job: &Job, lease: &Lease) -> PipelineResult<StageOutput> {
        let schema = self.ctx.catalog.require(&job.report_type)?;
        let artifacts = &job.artifacts;

        let artifact = match stage {
            Stage::Ingest => {
                let raw = self
                    .ctx
                    .ingestor
                    .clone()
                    .with_header_row(schema.header_row)
                    .ingest(&artifacts.upload, job.uploaded_file_ref.kind)?;
                debug!(rows = raw.row_count(), columns = raw.column_count(), "Upload parsed");
                Artifact::Raw(raw)
            }
            Stage::Validate => {
                let raw = input(&artifacts.raw, stage, "raw table")?;
                let report = SchemaValidator::new(schema)
                    .with_rates(&self.ctx.rates)
                    .validate(raw)?;
                info!(
                    total = report.total_rows,
                    valid = report.valid_count(),
                    violations = report.violations.len(),
                    "Validation finished"
                );
                if !report.has_valid_rows() {
                    return Err(PipelineError::NoValidData {
                        total_rows: report.total_rows,
                        violations: report.violations.len(),
                    });
                }
                Artifact::Validation(report)
            }
            Stage::Normalize => {
                let raw = input(&artifacts.raw, stage, "raw table")?;
                let report = input(&artifacts.validation, stage, "validation report")?;
                let table = DataNormalizer::new(schema, &self.ctx.rates).normalize(raw, report)?;
                debug!(rows = table.row_count(), rates = %table.rates_version, "Rows normalized");
                Artifact::Normalized(table)
            }
            Stage::Analyze => {
                let table = input(&artifacts.normalized, stage, "normalized table")?;
                let outcome = self.ctx.analysis.analyze(schema, table).await?;
                return Ok(StageOutput {
                    artifact: Artifact::Analysis(outcome.result),
                    attempts: outcome.attempts,
                });
            }
            Stage::Compose => Artifact::Document(self.compose(schema, job)?),
            Stage::Render => {
                let doc = input(&artifacts.document, stage, "report document")?;
                let pdf = self.ctx.pdf.render(doc)?;
                debug!(pages = pdf.page_count, bytes = pdf.bytes.len(), "PDF written");
                Artifact::Pdf(pdf)
            }
            Stage::Deliver => Artifact::Delivered(self.deliver(job, lease).await?),
        };
        Ok(StageOutput::new(artifact))
    }

    fn compose(&self, schema: &ReportSchema, job: &Job) -> PipelineResult<ReportDocument> {
        let artifacts = &job.artifacts;
        let table = input(&artifacts.normalized, Stage::Compose, "normalized table")?;
        let report = input(&artifacts.validation, Stage::Compose, "validation report")?;
        let analysis = input(&artifacts.analysis, Stage::Compose, "analysis")?;

        let charts = self.ctx.charts.render_all(schema, table, analysis)?;
        let doc = ReportComposer::new(schema, self.ctx.compose.clone()).compose(
            table,
            report,
            analysis,
            &charts,
            Utc::now(),
        );
        debug!(
            sections = doc.sections.len(),
            charts = doc.charts.len(),
            "Report composed"
        );
        Ok(doc)
    }

    /// Send the report, keeping the delivery record on the job even on failure
    async fn deliver(&self, job: &Job, lease: &Lease) -> PipelineResult<DeliveryRecord> {
        let artifacts = &job.artifacts;
        let recipient = job
            .recipient
            .as_deref()
            .ok_or_else(|| PipelineError::missing(Stage::Deliver.name(), "recipient"))?;
        let doc = input(&artifacts.document, Stage::Deliver, "report document")?;
        let pdf = input(&artifacts.pdf, Stage::Deliver, "PDF")?;
        let table = input(&artifacts.normalized, Stage::Deliver, "normalized table")?;
        let analysis = input(&artifacts.analysis, Stage::Deliver, "analysis")?;

        let job_id = job.id.to_string();
        let message = ReportEmail {
            job_id: &job_id,
            title: &doc.title,
            report_type: &job.report_type,
            record_count: table.row_count(),
            summary: &analysis.summary_text,
            generated_at: doc.generated_at,
            sampled: analysis.sampled,
        }
        .message(
            &self.ctx.delivery.config().from,
            recipient,
            Attachment::pdf(pdf.filename(), pdf.bytes.clone()),
        );

        let mut record = artifacts
            .delivery
            .clone()
            .unwrap_or_else(|| DeliveryRecord::new(job.id.as_uuid(), recipient));
        let sent = self.ctx.delivery.deliver(&mut record, &message).await;

        let kept = record.clone();
        self.store
            .update(job.id, lease, |job| job.artifacts.delivery = Some(kept))?;
        sent?;
        Ok(record)
    }
}

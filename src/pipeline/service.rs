//! Job intake and the worker pool
//!
//! [`PipelineService::submit`] registers a job and returns at once; a Tokio task
//! gated by a semaphore runs it. At most `workers` jobs run at the same time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult, StoreError, SubmitError};
use super::executor::{JobExecutor, PipelineContext};
use super::job::{FileRef, Job, JobFailure, JobId, JobStatusView};
use super::store::JobStore;
use crate::delivery::validate_address;
use crate::import::{FileKind, IngestError};

/// A file uploaded for processing
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Declared format; derived from the file name when absent
    pub kind: Option<FileKind>,
    pub report_type: String,
    pub requesting_user_id: String,
    /// Where to email the finished report
    pub recipient: Option<String>,
}

/// Accepts uploads and runs them as jobs
pub struct PipelineService {
    ctx: Arc<PipelineContext>,
    store: Arc<JobStore>,
    permits: Arc<Semaphore>,
    max_upload_bytes: usize,
    accepting: AtomicBool,
    spawned: AtomicUsize,
}

impl PipelineService {
    pub fn new(config: &PipelineConfig, ctx: PipelineContext) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::ConfigError)?;
        Ok(Self {
            ctx: Arc::new(ctx),
            store: Arc::new(JobStore::new(config.lease_ttl())),
            permits: Arc::new(Semaphore::new(config.workers)),
            max_upload_bytes: config.max_upload_bytes,
            accepting: AtomicBool::new(true),
            spawned: AtomicUsize::new(0),
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Register an upload and schedule it
    ///
    /// Must be called from within a Tokio runtime. An identical upload from the
    /// same user for the same report type returns the id of the job already
    /// working on it.
    pub fn submit(&self, request: UploadRequest) -> Result<JobId, SubmitError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }
        self.ctx.catalog.require(&request.report_type)?;
        if request.requesting_user_id.trim().is_empty() {
            return Err(SubmitError::InvalidRequest(
                "requesting user is missing".to_string(),
            ));
        }
        if request.bytes.is_empty() {
            return Err(SubmitError::EmptyUpload);
        }
        if request.bytes.len() > self.max_upload_bytes {
            return Err(IngestError::FileTooLarge {
                size: request.bytes.len(),
                limit: self.max_upload_bytes,
            }
            .into());
        }
        let kind = match request.kind {
            Some(kind) => kind,
            None => FileKind::from_file_name(&request.file_name)?,
        };
        let recipient = request
            .recipient
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if let Some(address) = &recipient {
            validate_address(address).map_err(|e| SubmitError::InvalidRequest(e.to_string()))?;
        }

        let file = FileRef::describe(request.file_name, kind, &request.bytes);
        let job = Job::new(
            request.report_type,
            file,
            request.bytes,
            request.requesting_user_id,
            recipient,
        );
        let (id, inserted) = self.store.insert_unique(job);
        if !inserted {
            info!(job_id = %id, "Identical upload already in progress");
            return Ok(id);
        }

        info!(job_id = %id, kind = kind.name(), "Job submitted");
        self.spawn(id);
        Ok(id)
    }

    fn spawn(&self, id: JobId) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let executor = JobExecutor::new(self.ctx.clone(), self.store.clone(), format!("worker-{n}"));
        let permits = self.permits.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match executor.run(id).await {
                Ok(status) => debug!(job_id = %id, %status, "Worker finished job"),
                Err(PipelineError::Store(StoreError::Finished(_))) => {
                    debug!(job_id = %id, "Job finished before a worker picked it up")
                }
                Err(PipelineError::Store(StoreError::Leased { holder, .. })) => {
                    debug!(job_id = %id, %holder, "Job is held by another worker")
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Worker gave up job");
                    let failure = JobFailure {
                        kind: e.kind(),
                        message: e.user_message(),
                        detail: e.to_string(),
                    };
                    match store.abandon(id, failure) {
                        Ok(true) => info!(job_id = %id, "Abandoned job marked failed"),
                        Ok(false) => {}
                        Err(e) => warn!(job_id = %id, error = %e, "Could not fail abandoned job"),
                    }
                }
            }
        });
    }

    pub fn status(&self, id: JobId) -> Option<JobStatusView> {
        self.store.view(id)
    }

    /// Request cancellation; false when the job had already finished
    pub fn cancel(&self, id: JobId) -> PipelineResult<bool> {
        Ok(self.store.request_cancel(id)?)
    }

    /// Wait until the job is completed, failed or cancelled
    pub async fn wait(&self, id: JobId) -> Option<JobStatusView> {
        self.store.wait_finished(id).await
    }

    /// Restart jobs whose worker stopped renewing its lease
    pub fn reclaim_expired(&self) -> Vec<JobId> {
        let expired = self.store.expired(Utc::now());
        for id in &expired {
            info!(job_id = %id, "Reclaiming job with expired lease");
            self.spawn(*id);
        }
        expired
    }

    /// Drop finished jobs older than `cutoff`
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let evicted = self.store.evict_finished_before(cutoff);
        if evicted > 0 {
            info!(evicted, "Evicted finished jobs");
        }
        evicted
    }

    /// Stop accepting new uploads; running jobs continue
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::Release);
    }
}

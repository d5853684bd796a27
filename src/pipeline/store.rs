//! In-memory job store with exclusive leases
//!
//! Jobs live in an arena keyed by [`JobId`]. A worker must hold the job's
//! current, unexpired [`Lease`] to change it. Leases expire unless renewed, so a
//! job whose worker disappeared can be reclaimed by another worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::job::{Job, JobFailure, JobId, JobStatus, JobStatusView};

/// Exclusive right to mutate one job until `expires_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub owner: String,
    pub token: u64,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct Entry {
    job: Job,
    lease: Option<Lease>,
}

/// Job arena shared by the service and its workers
#[derive(Debug)]
pub struct JobStore {
    entries: Mutex<HashMap<JobId, Entry>>,
    next_token: AtomicU64,
    lease_ttl: chrono::Duration,
    finished: Notify,
}

impl JobStore {
    pub fn new(lease_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            lease_ttl: chrono::Duration::from_std(lease_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
            finished: Notify::new(),
        }
    }

    /// How often a worker should renew its lease while a stage runs
    pub fn heartbeat_interval(&self) -> Duration {
        (self.lease_ttl / 3)
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_millis(1))
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<JobId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self, owner: &str) -> Lease {
        Lease {
            owner: owner.to_string(),
            token: self.next_token.fetch_add(1, Ordering::Relaxed),
            expires_at: Utc::now() + self.lease_ttl,
        }
    }

    /// Add a new job
    pub fn insert(&self, job: Job) -> JobId {
        let id = job.id;
        self.entries().insert(id, Entry { job, lease: None });
        id
    }

    /// Snapshot of a job; artifacts are shared, not copied
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.entries().get(&id).map(|e| e.job.clone())
    }

    pub fn view(&self, id: JobId) -> Option<JobStatusView> {
        self.entries().get(&id).map(|e| e.job.view())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Take the lease on a job
    ///
    /// Fails while another owner holds an unexpired lease. An expired lease
    /// is simply replaced, which is how abandoned jobs are reclaimed.
    pub fn acquire(&self, id: JobId, owner: &str) -> StoreResult<Lease> {
        let now = Utc::now();
        let mut entries = self.entries();
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if entry.job.is_terminal() {
            return Err(StoreError::Finished(id));
        }
        if let Some(current) = &entry.lease
            && !current.is_expired(now)
            && current.owner != owner
        {
            return Err(StoreError::Leased {
                job_id: id,
                holder: current.owner.clone(),
            });
        }
        let lease = self.issue(owner);
        debug!(job_id = %id, owner, token = lease.token, "Lease acquired");
        entry.lease = Some(lease.clone());
        Ok(lease)
    }

    fn check<'a>(entry: &'a mut Entry, id: JobId, lease: &Lease) -> StoreResult<&'a mut Job> {
        match &entry.lease {
            Some(current) if current.token == lease.token && current.owner == lease.owner => {
                if current.is_expired(Utc::now()) {
                    Err(StoreError::LeaseExpired(id))
                } else {
                    Ok(&mut entry.job)
                }
            }
            _ => Err(StoreError::LeaseNotHeld {
                job_id: id,
                owner: lease.owner.clone(),
            }),
        }
    }

    /// Extend a held lease by the store's TTL
    pub fn renew(&self, id: JobId, lease: &Lease) -> StoreResult<Lease> {
        let mut entries = self.entries();
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        Self::check(entry, id, lease)?;
        let renewed = Lease {
            expires_at: Utc::now() + self.lease_ttl,
            ..lease.clone()
        };
        entry.lease = Some(renewed.clone());
        Ok(renewed)
    }

    /// Give a lease back
    pub fn release(&self, id: JobId, lease: &Lease) -> StoreResult<()> {
        let mut entries = self.entries();
        let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if entry
            .lease
            .as_ref()
            .is_some_and(|current| current.token == lease.token)
        {
            entry.lease = None;
        }
        Ok(())
    }

    /// Mutate a job under its lease
    pub fn update<R>(
        &self,
        id: JobId,
        lease: &Lease,
        f: impl FnOnce(&mut Job) -> R,
    ) -> StoreResult<R> {
        let (result, finished) = {
            let mut entries = self.entries();
            let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            let job = Self::check(entry, id, lease)?;
            let was_terminal = job.is_terminal();
            let result = f(job);
            (result, !was_terminal && job.is_terminal())
        };
        if finished {
            self.finished.notify_waiters();
        }
        Ok(result)
    }

    /// Fail a job whose worker gave up on it
    ///
    /// Does nothing when the job already finished or another worker holds a
    /// live lease on it. Returns whether the job was failed.
    pub fn abandon(&self, id: JobId, failure: JobFailure) -> StoreResult<bool> {
        let now = Utc::now();
        {
            let mut entries = self.entries();
            let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if entry.job.is_terminal() || entry.lease.as_ref().is_some_and(|l| !l.is_expired(now)) {
                return Ok(false);
            }
            entry.job.fail(failure)?;
            entry.lease = None;
        }
        debug!(job_id = %id, "Abandoned job failed");
        self.finished.notify_waiters();
        Ok(true)
    }

    /// Ask for a job to stop
    ///
    /// A job nobody is working on is cancelled on the spot; a running job
    /// stops at its next stage boundary. Returns false for finished jobs.
    pub fn request_cancel(&self, id: JobId) -> StoreResult<bool> {
        let now = Utc::now();
        let cancelled_now = {
            let mut entries = self.entries();
            let entry = entries.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if entry.job.is_terminal() {
                return Ok(false);
            }
            entry.job.cancel_requested = true;
            let idle = entry.lease.as_ref().is_none_or(|l| l.is_expired(now));
            if idle && entry.job.status == JobStatus::Created {
                entry.job.transition(JobStatus::Cancelled)?;
                entry.lease = None;
                true
            } else {
                false
            }
        };
        if cancelled_now {
            debug!(job_id = %id, "Queued job cancelled");
            self.finished.notify_waiters();
        }
        Ok(true)
    }

    pub fn is_cancel_requested(&self, id: JobId) -> bool {
        self.entries()
            .get(&id)
            .is_some_and(|e| e.job.cancel_requested)
    }

    /// Unfinished jobs whose lease has expired
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<JobId> {
        self.entries()
            .values()
            .filter(|e| !e.job.is_terminal())
            .filter(|e| e.lease.as_ref().is_some_and(|l| l.is_expired(now)))
            .map(|e| e.job.id)
            .collect()
    }

    /// Unfinished job for the same upload, user and report type
    pub fn find_active_duplicate(
        &self,
        requesting_user_id: &str,
        report_type: &str,
        sha256: &str,
    ) -> Option<JobId> {
        Self::duplicate_of(&self.entries(), requesting_user_id, report_type, sha256)
    }

    fn duplicate_of(
        entries: &HashMap<JobId, Entry>,
        requesting_user_id: &str,
        report_type: &str,
        sha256: &str,
    ) -> Option<JobId> {
        entries
            .values()
            .find(|e| {
                !e.job.is_terminal()
                    && !e.job.cancel_requested
                    && e.job.requesting_user_id == requesting_user_id
                    && e.job.report_type == report_type
                    && e.job.uploaded_file_ref.sha256 == sha256
            })
            .map(|e| e.job.id)
    }

    /// Insert `job` unless an identical active job exists
    ///
    /// Returns the id to report and whether `job` was inserted.
    pub fn insert_unique(&self, job: Job) -> (JobId, bool) {
        let mut entries = self.entries();
        if let Some(existing) = Self::duplicate_of(
            &entries,
            &job.requesting_user_id,
            &job.report_type,
            &job.uploaded_file_ref.sha256,
        ) {
            return (existing, false);
        }
        let id = job.id;
        entries.insert(id, Entry { job, lease: None });
        (id, true)
    }

    /// Remove a finished job
    pub fn evict(&self, id: JobId) -> StoreResult<Job> {
        let mut entries = self.entries();
        match entries.get(&id) {
            None => Err(StoreError::NotFound(id)),
            Some(e) if !e.job.is_terminal() => Err(StoreError::StillActive(id)),
            Some(_) => entries
                .remove(&id)
                .map(|e| e.job)
                .ok_or(StoreError::NotFound(id)),
        }
    }

    /// Remove every job that finished before `cutoff`; returns how many
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| !e.job.finished_at.is_some_and(|at| at < cutoff));
        before - entries.len()
    }

    /// Wait until the job reaches a terminal state
    ///
    /// Returns `None` if the job is unknown or evicted while waiting.
    pub async fn wait_finished(&self, id: JobId) -> Option<JobStatusView> {
        loop {
            let notified = self.finished.notified();
            match self.view(id) {
                None => return None,
                Some(view) if view.status.is_terminal() => return Some(view),
                Some(_) => notified.await,
            }
        }
    }
}

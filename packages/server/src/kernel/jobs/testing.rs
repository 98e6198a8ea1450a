//! In-memory doubles for the pipeline's trait seams.
//!
//! Used by the integration suites in `tests/` to exercise the worker
//! and ingress handler without a database or network. The job store
//! double mirrors the Postgres transition guards exactly, including the
//! claim conditions, so the claim-race tests mean something.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use notion::{api_error, NotionError, Properties};
use uuid::Uuid;

use super::dedup::DedupStore;
use super::job::{retry_delay, Job, JobStatus, LEASE_DURATION};
use super::store::{EnqueueResult, FailOutcome, JobStore};
use crate::kernel::messaging::MessagingClient;
use crate::kernel::writer::PageWriter;

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_jobs(&self) -> Vec<Job> {
        self.jobs.lock().expect("job store lock poisoned").clone()
    }

    /// Backdate a processing job's lease, simulating a crashed worker.
    pub fn expire_lease(&self, id: Uuid) {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.lease_expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }

    fn with_job<T>(&self, id: Uuid, f: impl FnOnce(&mut Job) -> T) -> Result<T> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| anyhow!("job {id} not found"))?;
        Ok(f(job))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<EnqueueResult> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let duplicate = jobs
            .iter()
            .any(|j| j.tenant_id == job.tenant_id && j.webhook_event_id == job.webhook_event_id);
        if duplicate {
            return Ok(EnqueueResult::Duplicate);
        }
        jobs.push(job);
        Ok(EnqueueResult::Created)
    }

    async fn fetch_queued(&self, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        Ok(jobs
            .iter()
            .filter(|j| j.is_claimable(now))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn reap_exhausted(&self) -> Result<u64> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let mut reaped = 0;
        for job in jobs.iter_mut().filter(|j| j.is_exhausted_expired(now)) {
            job.status = JobStatus::Dead;
            job.lease_expires_at = None;
            job.last_error
                .get_or_insert_with(|| "lease expired on final attempt".to_string());
            job.updated_at = now;
            reaped += 1;
        }
        Ok(reaped)
    }

    async fn claim(&self, id: Uuid) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            return Ok(None);
        };
        if !job.is_claimable(now) {
            return Ok(None);
        }
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.generation += 1;
        job.lease_expires_at = Some(now + chrono::Duration::from_std(LEASE_DURATION)?);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        self.with_job(id, |job| {
            if job.status == JobStatus::Processing {
                job.status = JobStatus::Done;
                job.lease_expires_at = None;
                job.updated_at = Utc::now();
            }
        })
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<FailOutcome> {
        self.with_job(id, |job| {
            if job.status != JobStatus::Processing {
                return Err(anyhow!("job {id} is not processing"));
            }
            job.last_error = Some(error.to_string());
            job.lease_expires_at = None;
            job.updated_at = Utc::now();
            if job.out_of_attempts() {
                job.status = JobStatus::Dead;
                job.not_before = None;
                Ok(FailOutcome::DeadLettered)
            } else {
                job.status = JobStatus::Queued;
                job.not_before =
                    Some(Utc::now() + chrono::Duration::from_std(retry_delay(job.attempts))?);
                Ok(FailOutcome::Requeued)
            }
        })?
    }

    async fn requeue(&self, id: Uuid) -> Result<()> {
        self.with_job(id, |job| {
            if matches!(
                job.status,
                JobStatus::Queued | JobStatus::Failed | JobStatus::Dead
            ) {
                job.status = JobStatus::Queued;
                job.not_before = None;
                job.lease_expires_at = None;
                job.updated_at = Utc::now();
            }
        })
    }

    async fn ignore(&self, id: Uuid) -> Result<()> {
        self.with_job(id, |job| {
            if matches!(
                job.status,
                JobStatus::Queued | JobStatus::Processing | JobStatus::Failed
            ) {
                job.status = JobStatus::Ignored;
                job.lease_expires_at = None;
                job.updated_at = Utc::now();
            }
        })
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        Ok(jobs.iter().filter(|j| j.status == status).count() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryDedupStore {
    keys: Mutex<HashMap<String, Uuid>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marked_keys(&self) -> Vec<String> {
        self.keys
            .lock()
            .expect("dedup lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.keys.lock().expect("dedup lock poisoned").contains_key(key))
    }

    async fn mark(&self, key: &str, tenant_id: Uuid) -> Result<()> {
        self.keys
            .lock()
            .expect("dedup lock poisoned")
            .entry(key.to_string())
            .or_insert(tenant_id);
        Ok(())
    }
}

/// One observed downstream write.
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub destination_id: String,
    pub properties: Properties,
}

/// Page writer double: records every write, optionally failing a
/// scripted sequence of calls first.
#[derive(Default)]
pub struct RecordingWriter {
    writes: Mutex<Vec<RecordedWrite>>,
    planned_failures: Mutex<VecDeque<u16>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next write with the given HTTP-style status.
    /// Calls queue up; each write consumes one planned failure.
    pub fn fail_next_with(&self, status: u16) {
        self.planned_failures
            .lock()
            .expect("writer lock poisoned")
            .push_back(status);
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().expect("writer lock poisoned").clone()
    }
}

#[async_trait]
impl PageWriter for RecordingWriter {
    async fn write_page(
        &self,
        destination_id: &str,
        properties: Properties,
    ) -> Result<String, NotionError> {
        if let Some(status) = self
            .planned_failures
            .lock()
            .expect("writer lock poisoned")
            .pop_front()
        {
            return Err(api_error(status, "planned failure"));
        }

        let mut writes = self.writes.lock().expect("writer lock poisoned");
        writes.push(RecordedWrite {
            destination_id: destination_id.to_string(),
            properties,
        });
        Ok(format!("page-{}", writes.len()))
    }
}

/// Messaging client double: records replies, serves static content urls.
#[derive(Default)]
pub struct StaticMessagingClient {
    replies: Mutex<Vec<(String, String)>>,
    fail_replies: bool,
}

impl StaticMessagingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reply attempt will fail (for ack-swallowing tests).
    pub fn failing_replies() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fail_replies: true,
        }
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().expect("messaging lock poisoned").clone()
    }
}

#[async_trait]
impl MessagingClient for StaticMessagingClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        if self.fail_replies {
            return Err(anyhow!("reply endpoint unavailable"));
        }
        self.replies
            .lock()
            .expect("messaging lock poisoned")
            .push((reply_token.to_string(), text.to_string()));
        Ok(())
    }

    async fn content_url(&self, provider_message_id: &str) -> Result<String> {
        Ok(format!("https://content.invalid/{provider_message_id}"))
    }
}

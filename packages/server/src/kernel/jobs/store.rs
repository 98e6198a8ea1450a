//! Durable job store and claim protocol.
//!
//! All cross-worker coordination happens through `claim`: a single
//! conditional UPDATE that moves a job from `queued` to `processing`,
//! increments `attempts` and `generation`, and stamps a lease. A lost
//! race affects zero rows and the caller skips the job. Processing jobs
//! whose lease expired are re-claimable, so a crashed worker cannot
//! strand a job forever.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::job::{Job, JobPayload, JobStatus, LEASE_DURATION};

/// Outcome of an idempotent enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Created,
    /// A job for this `(tenant, event)` key already exists.
    Duplicate,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Returned to the queue; a later worker pass will retry it.
    Requeued,
    /// Retry budget exhausted; the job is dead until an operator acts.
    DeadLettered,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new queued job; duplicate event keys are dropped.
    async fn enqueue(&self, job: Job) -> Result<EnqueueResult>;

    /// Jobs eligible for claiming: ready `queued` rows plus
    /// expired-lease `processing` rows with attempts remaining,
    /// oldest first.
    async fn fetch_queued(&self, limit: i64) -> Result<Vec<Job>>;

    /// Dead-letter `processing` jobs whose lease expired with no
    /// attempts left (a worker crashed out of the final attempt).
    /// Returns how many jobs were moved.
    async fn reap_exhausted(&self) -> Result<u64>;

    /// Conditionally take exclusive processing rights over one job.
    ///
    /// Returns the claimed job (with `attempts` already incremented) or
    /// `None` if another caller got there first.
    async fn claim(&self, id: Uuid) -> Result<Option<Job>>;

    /// Mark a processing job done.
    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Record a failed attempt: requeue with backoff while attempts
    /// remain, dead-letter otherwise.
    async fn fail(&self, id: Uuid, error: &str) -> Result<FailOutcome>;

    /// Operator action: put a queued/failed/dead job back in the queue.
    /// Resets nothing but status and the backoff gate.
    async fn requeue(&self, id: Uuid) -> Result<()>;

    /// Operator action: park a job so the worker never touches it.
    async fn ignore(&self, id: Uuid) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Job>>;

    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;
}

const JOB_COLUMNS: &str = "id, tenant_id, webhook_event_id, destination_id, payload, status, \
     attempts, max_attempts, generation, not_before, lease_expires_at, last_error, \
     created_at, updated_at";

/// Row shape for sqlx; payload is raw jsonb until deserialized.
#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    tenant_id: Uuid,
    webhook_event_id: String,
    destination_id: String,
    payload: serde_json::Value,
    status: JobStatus,
    attempts: i32,
    max_attempts: i32,
    generation: i32,
    not_before: Option<DateTime<Utc>>,
    lease_expires_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let payload: JobPayload = serde_json::from_value(self.payload)?;
        Ok(Job {
            id: self.id,
            tenant_id: self.tenant_id,
            webhook_event_id: self.webhook_event_id,
            destination_id: self.destination_id,
            payload,
            status: self.status,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            generation: self.generation,
            not_before: self.not_before,
            lease_expires_at: self.lease_expires_at,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(&self, job: Job) -> Result<EnqueueResult> {
        let payload = serde_json::to_value(&job.payload)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, tenant_id, webhook_event_id, destination_id, payload,
                status, attempts, max_attempts, generation
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, webhook_event_id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(job.tenant_id)
        .bind(&job.webhook_event_id)
        .bind(&job.destination_id)
        .bind(payload)
        .bind(job.status)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.generation)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(if inserted == 1 {
            EnqueueResult::Created
        } else {
            EnqueueResult::Duplicate
        })
    }

    async fn fetch_queued(&self, limit: i64) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE (status = 'queued' AND (not_before IS NULL OR not_before <= NOW()))
               OR (status = 'processing' AND lease_expires_at < NOW()
                   AND attempts < max_attempts)
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn reap_exhausted(&self) -> Result<u64> {
        let reaped = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead',
                lease_expires_at = NULL,
                last_error = COALESCE(last_error, 'lease expired on final attempt'),
                updated_at = NOW()
            WHERE status = 'processing'
              AND lease_expires_at < NOW()
              AND attempts >= max_attempts
            "#,
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(reaped)
    }

    async fn claim(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = 'processing',
                attempts = attempts + 1,
                generation = generation + 1,
                lease_expires_at = NOW() + $2 * INTERVAL '1 second',
                updated_at = NOW()
            WHERE id = $1
              AND (
                    (status = 'queued' AND (not_before IS NULL OR not_before <= NOW()))
                 OR (status = 'processing' AND lease_expires_at < NOW()
                     AND attempts < max_attempts)
              )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(LEASE_DURATION.as_secs() as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<FailOutcome> {
        // attempts was already incremented by the claim; this only
        // decides requeue-with-backoff vs dead letter.
        let status = sqlx::query_scalar::<_, JobStatus>(
            r#"
            UPDATE jobs
            SET status = CASE WHEN attempts >= max_attempts
                              THEN 'dead'::job_status
                              ELSE 'queued'::job_status END,
                not_before = CASE WHEN attempts >= max_attempts
                                  THEN NULL
                                  ELSE NOW() + LEAST(POWER(2, attempts), 3600) * INTERVAL '1 second' END,
                lease_expires_at = NULL,
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING status
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;

        Ok(match status {
            JobStatus::Dead => FailOutcome::DeadLettered,
            _ => FailOutcome::Requeued,
        })
    }

    async fn requeue(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued',
                not_before = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'failed', 'dead')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ignore(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'ignored',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'processing', 'failed')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = $1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

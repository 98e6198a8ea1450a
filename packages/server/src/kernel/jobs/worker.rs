//! Worker: claims queued jobs and performs the downstream page write.
//!
//! Every invocation is independent; any number may run in parallel
//! (scheduled ticks plus manual triggers) because the only shared
//! resource is the job store and its conditional claim. A job's failure
//! never escapes its own processing: it is recorded against the job and
//! the rest of the batch continues.
//!
//! Retries happen by re-queueing with a `not_before` backoff gate, not
//! by looping in-process, so pacing is governed by the scheduling
//! cadence plus the exponential delay.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use notion::{NotionError, Properties, PropertyValue};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dedup::DedupStore;
use super::job::{Job, JobPayload};
use super::store::{FailOutcome, JobStore};
use crate::kernel::messaging::MessagingClient;
use crate::kernel::metrics::{counters, AuditEntry, MetricsSink};
use crate::kernel::writer::PageWriter;

/// Configuration for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of jobs to claim per invocation.
    pub batch_size: i64,
    /// Cadence of the scheduled loop.
    pub poll_interval: Duration,
    /// Worker ID for this instance.
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            poll_interval: Duration::from_secs(60),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

/// Result of one worker invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// Per-job failure, split so only downstream API errors feed the
/// rate-limit/server-error counters.
enum ProcessError {
    Write(NotionError),
    Other(anyhow::Error),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Write(e) => write!(f, "{e}"),
            ProcessError::Other(e) => write!(f, "{e:#}"),
        }
    }
}

pub struct Worker {
    store: Arc<dyn JobStore>,
    dedup: Arc<dyn DedupStore>,
    writer: Arc<dyn PageWriter>,
    messaging: Arc<dyn MessagingClient>,
    metrics: Arc<dyn MetricsSink>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        dedup: Arc<dyn DedupStore>,
        writer: Arc<dyn PageWriter>,
        messaging: Arc<dyn MessagingClient>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            store,
            dedup,
            writer,
            messaging,
            metrics,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Claim and process one batch of queued jobs.
    pub async fn run_batch(&self) -> Result<BatchSummary> {
        let started = Instant::now();

        // Jobs that crashed out of their final attempt can never be
        // re-claimed; move them to the dead letter queue first.
        let reaped = self.store.reap_exhausted().await?;
        if reaped > 0 {
            warn!(count = reaped, "dead-lettered jobs with expired leases and no attempts left");
            for _ in 0..reaped {
                self.metrics.incr(counters::JOBS_DEAD_LETTERED);
            }
        }

        let candidates = self.store.fetch_queued(self.config.batch_size).await?;

        if candidates.is_empty() {
            return Ok(BatchSummary {
                duration: started.elapsed(),
                ..BatchSummary::default()
            });
        }

        debug!(count = candidates.len(), "fetched queued jobs");

        // Claim first; lost races are skipped without side effects.
        let mut claimed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.store.claim(candidate.id).await {
                Ok(Some(job)) => claimed.push(job),
                Ok(None) => {
                    debug!(job_id = %candidate.id, "claim lost, skipping");
                }
                Err(e) => {
                    error!(job_id = %candidate.id, error = %e, "claim failed");
                }
            }
        }

        // Jobs are independent; process them concurrently.
        let outcomes =
            futures::future::join_all(claimed.into_iter().map(|job| self.process_job(job))).await;

        let processed = outcomes.len();
        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let summary = BatchSummary {
            processed,
            succeeded,
            failed: processed - succeeded,
            duration: started.elapsed(),
        };

        info!(
            worker_id = %self.config.worker_id,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = summary.duration.as_millis() as u64,
            "worker batch complete"
        );

        Ok(summary)
    }

    /// Run batches on the configured cadence until the task is dropped.
    pub async fn run_forever(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.run_batch().await {
                error!(error = %e, "worker batch failed to run");
            }
        }
    }

    /// Process one claimed job; returns whether the write succeeded.
    /// All failure paths are recorded on the job, never propagated.
    async fn process_job(&self, job: Job) -> bool {
        let write_started = Instant::now();
        let result = self.write_downstream(&job).await;

        match result {
            Ok(page_id) => {
                self.metrics
                    .record_latency("downstream.write", write_started.elapsed());

                if let Err(e) = self.store.complete(job.id).await {
                    error!(job_id = %job.id, error = %e, "failed to mark job done");
                }
                if let Err(e) = self.dedup.mark(&job.event_key(), job.tenant_id).await {
                    // The unique job index still protects against
                    // double-enqueue; log and move on.
                    error!(job_id = %job.id, error = %e, "failed to write dedup marker");
                }

                self.metrics.incr(counters::JOBS_SUCCEEDED);
                self.metrics.audit(AuditEntry {
                    job_id: job.id,
                    tenant_id: job.tenant_id,
                    action: "done".to_string(),
                    detail: Some(format!("page {page_id}")),
                });
                debug!(job_id = %job.id, page_id = %page_id, "job done");
                true
            }
            Err(e) => {
                self.classify_failure(&e);
                let message = e.to_string();
                warn!(job_id = %job.id, attempts = job.attempts, error = %message, "job attempt failed");

                let outcome = match self.store.fail(job.id, &message).await {
                    Ok(outcome) => outcome,
                    Err(store_err) => {
                        error!(job_id = %job.id, error = %store_err, "failed to record job failure");
                        return false;
                    }
                };

                self.metrics.incr(counters::JOBS_FAILED);
                let action = match outcome {
                    FailOutcome::Requeued => "requeued",
                    FailOutcome::DeadLettered => {
                        self.metrics.incr(counters::JOBS_DEAD_LETTERED);
                        "dead_lettered"
                    }
                };
                self.metrics.audit(AuditEntry {
                    job_id: job.id,
                    tenant_id: job.tenant_id,
                    action: action.to_string(),
                    detail: Some(message),
                });
                false
            }
        }
    }

    /// Build destination properties for the payload and write the page.
    async fn write_downstream(&self, job: &Job) -> Result<String, ProcessError> {
        let properties = match &job.payload {
            JobPayload::Text { properties, .. } => properties.clone(),
            JobPayload::Generic { properties } => properties.clone(),
            JobPayload::ImageRef {
                provider_message_id,
            } => {
                let url = self
                    .messaging
                    .content_url(provider_message_id)
                    .await
                    .map_err(ProcessError::Other)?;
                image_properties(provider_message_id, &url)
            }
            JobPayload::Location {
                title,
                address,
                latitude,
                longitude,
            } => location_properties(title.as_deref(), address.as_deref(), *latitude, *longitude),
        };

        self.writer
            .write_page(&job.destination_id, properties)
            .await
            .map_err(ProcessError::Write)
    }

    /// Error classification feeds metrics only; the retry decision is
    /// made by the store from attempts alone.
    fn classify_failure(&self, error: &ProcessError) {
        if let ProcessError::Write(e) = error {
            if e.is_rate_limited() {
                self.metrics.incr(counters::DOWNSTREAM_RATE_LIMITED);
            } else if e.is_server_error() {
                self.metrics.incr(counters::DOWNSTREAM_SERVER_ERROR);
            }
        }
    }
}

fn image_properties(provider_message_id: &str, content_url: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("Name".to_string(), PropertyValue::title("Image message"));
    properties.insert(
        "Attachment".to_string(),
        PropertyValue::external_file(provider_message_id, content_url),
    );
    properties
}

fn location_properties(
    title: Option<&str>,
    address: Option<&str>,
    latitude: f64,
    longitude: f64,
) -> Properties {
    let mut properties = Properties::new();
    properties.insert(
        "Name".to_string(),
        PropertyValue::title(title.unwrap_or("Location")),
    );
    if let Some(address) = address {
        properties.insert("Address".to_string(), PropertyValue::rich_text(address));
    }
    properties.insert(
        "Map".to_string(),
        PropertyValue::url(format!("https://maps.google.com/?q={latitude},{longitude}")),
    );
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_small_batches() {
        let config = WorkerConfig::default();
        assert_eq!(config.batch_size, 5);
        assert!(config.worker_id.starts_with("worker-"));
    }

    #[test]
    fn image_properties_reference_content_url() {
        let properties = image_properties("m-1", "https://cdn.example/m-1");
        match properties.get("Attachment").unwrap() {
            PropertyValue::Files { files } => {
                assert_eq!(files[0].external.url, "https://cdn.example/m-1");
            }
            other => panic!("expected files property, got {other:?}"),
        }
    }

    #[test]
    fn location_properties_default_title_and_map_link() {
        let properties = location_properties(None, Some("1 Main St"), 35.0, 139.0);
        assert_eq!(
            properties.get("Name").unwrap().plain_text(),
            Some("Location")
        );
        match properties.get("Map").unwrap() {
            PropertyValue::Url { url } => assert!(url.contains("35,139")),
            other => panic!("expected url property, got {other:?}"),
        }
    }
}

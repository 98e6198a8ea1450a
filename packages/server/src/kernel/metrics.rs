//! Metrics and audit sink.
//!
//! The pipeline records counters, latency samples, and audit entries
//! through this trait. Core retry decisions never read from it; error
//! classification (rate-limited vs server error) exists only to feed
//! these counters.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

/// Counter names used by the pipeline.
pub mod counters {
    pub const JOBS_SUCCEEDED: &str = "jobs.succeeded";
    pub const JOBS_FAILED: &str = "jobs.failed";
    pub const JOBS_DEAD_LETTERED: &str = "jobs.dead_lettered";
    pub const DOWNSTREAM_RATE_LIMITED: &str = "downstream.rate_limited";
    pub const DOWNSTREAM_SERVER_ERROR: &str = "downstream.server_error";
    pub const EVENTS_DEDUPLICATED: &str = "ingress.events_deduplicated";
    pub const EVENTS_ENQUEUED: &str = "ingress.events_enqueued";
}

/// A structured audit entry for one job-level outcome.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub action: String,
    pub detail: Option<String>,
}

pub trait MetricsSink: Send + Sync {
    fn incr(&self, counter: &str);
    fn record_latency(&self, name: &str, elapsed: Duration);
    fn audit(&self, entry: AuditEntry);
}

/// Production sink: everything goes to structured logs.
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn incr(&self, counter: &str) {
        tracing::info!(counter = %counter, "metric.incr");
    }

    fn record_latency(&self, name: &str, elapsed: Duration) {
        tracing::info!(name = %name, ms = elapsed.as_millis() as u64, "metric.latency");
    }

    fn audit(&self, entry: AuditEntry) {
        tracing::info!(
            job_id = %entry.job_id,
            tenant_id = %entry.tenant_id,
            action = %entry.action,
            detail = entry.detail.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Test sink that records everything for assertions.
#[derive(Default)]
pub struct RecordingMetrics {
    counters: Mutex<HashMap<String, u64>>,
    latencies: Mutex<Vec<(String, Duration)>>,
    audits: Mutex<Vec<AuditEntry>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .expect("metrics lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn latency_samples(&self, name: &str) -> usize {
        self.latencies
            .lock()
            .expect("metrics lock poisoned")
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audits.lock().expect("metrics lock poisoned").clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn incr(&self, counter: &str) {
        *self
            .counters
            .lock()
            .expect("metrics lock poisoned")
            .entry(counter.to_string())
            .or_insert(0) += 1;
    }

    fn record_latency(&self, name: &str, elapsed: Duration) {
        self.latencies
            .lock()
            .expect("metrics lock poisoned")
            .push((name.to_string(), elapsed));
    }

    fn audit(&self, entry: AuditEntry) {
        self.audits.lock().expect("metrics lock poisoned").push(entry);
    }
}

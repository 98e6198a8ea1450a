//! Durable job machinery: model, stores, worker, test doubles.

pub mod dedup;
pub mod job;
pub mod store;
pub mod testing;
pub mod worker;

pub use dedup::{content_key, event_key, DedupStore, PgDedupStore};
pub use job::{retry_delay, Job, JobPayload, JobStatus, LEASE_DURATION, MAX_ATTEMPTS};
pub use store::{EnqueueResult, FailOutcome, JobStore, PgJobStore};
pub use worker::{BatchSummary, Worker, WorkerConfig};

//! Job model for the ingestion pipeline.
//!
//! One job per inbound sub-event that requires a downstream page write.
//! Jobs are created by the ingress handler and mutated only by the
//! worker's claim/complete/fail transitions plus the operator
//! requeue/ignore escape hatches. Nothing here ever deletes a job.

use chrono::{DateTime, Utc};
use notion::Properties;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::id::db_id;

/// Retry budget: a job is dead after this many processing attempts.
pub const MAX_ATTEMPTS: i32 = 5;

/// How long a claim holds the job before other workers may re-claim it.
pub const LEASE_DURATION: Duration = Duration::from_secs(60);

/// Cap on the requeue backoff delay.
const MAX_BACKOFF_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Done,
    Failed,
    Dead,
    Ignored,
}

/// What the worker must write downstream, one variant per message kind.
///
/// The routing switch in the worker matches on this exhaustively, so a
/// new message kind cannot be half-plumbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Text message; properties were prebuilt by the rule engine.
    Text {
        text: String,
        properties: Properties,
    },
    /// Media message; content is resolved at worker time by message id.
    ImageRef { provider_message_id: String },
    /// Location share.
    Location {
        title: Option<String>,
        address: Option<String>,
        latitude: f64,
        longitude: f64,
    },
    /// Pre-assembled property map (social/news-style ingestion).
    Generic { properties: Properties },
}

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = db_id())]
    pub id: Uuid,

    pub tenant_id: Uuid,
    /// Correlation key back to the originating platform event.
    pub webhook_event_id: String,
    pub destination_id: String,
    pub payload: JobPayload,

    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = 0)]
    pub attempts: i32,
    #[builder(default = MAX_ATTEMPTS)]
    pub max_attempts: i32,
    /// Bumped by every successful claim; stale completions can be detected.
    #[builder(default = 0)]
    pub generation: i32,

    /// Earliest time the job is eligible for claiming (retry backoff).
    #[builder(default, setter(strip_option))]
    pub not_before: Option<DateTime<Utc>>,
    /// Claim lease; an expired lease makes a processing job re-claimable.
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub last_error: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly enqueued job for one inbound sub-event.
    pub fn enqueued(
        tenant_id: Uuid,
        webhook_event_id: impl Into<String>,
        destination_id: impl Into<String>,
        payload: JobPayload,
    ) -> Self {
        Self::builder()
            .tenant_id(tenant_id)
            .webhook_event_id(webhook_event_id.into())
            .destination_id(destination_id.into())
            .payload(payload)
            .build()
    }

    /// Whether the retry budget is exhausted.
    pub fn out_of_attempts(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Dedup key for the originating event, written on terminal success.
    pub fn event_key(&self) -> String {
        format!("{}:{}", self.tenant_id, self.webhook_event_id)
    }

    /// Whether the job is eligible for claiming at `now`.
    ///
    /// An expired-lease `processing` job is only re-claimable while
    /// attempts remain: re-claiming after the final attempt would push
    /// `attempts` past the budget. Exhausted expired-lease jobs are
    /// dead-lettered by the reap pass instead.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            JobStatus::Queued => self.not_before.map_or(true, |t| t <= now),
            JobStatus::Processing => {
                !self.out_of_attempts() && self.lease_expires_at.is_some_and(|t| t < now)
            }
            _ => false,
        }
    }

    /// Whether the job crashed out of its final attempt: lease expired
    /// with no attempts left, so no worker will ever finish it.
    pub fn is_exhausted_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Processing
            && self.out_of_attempts()
            && self.lease_expires_at.is_some_and(|t| t < now)
    }
}

/// Backoff before the next attempt after `attempts` attempts so far.
pub fn retry_delay(attempts: i32) -> Duration {
    let secs = 2i64
        .checked_pow(attempts.max(0) as u32)
        .unwrap_or(MAX_BACKOFF_SECS)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs as u64)
}

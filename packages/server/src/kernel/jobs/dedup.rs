//! Deduplication store.
//!
//! A marker row proves an inbound event already produced its terminal
//! downstream effect. Markers are written by the worker on success
//! only: a job that is still failing and retrying has no marker, so a
//! platform-level redelivery after a crash is not falsely suppressed.
//! Expiry is an external cleanup job; this store only reads and writes.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn mark(&self, key: &str, tenant_id: Uuid) -> Result<()>;
}

/// Dedup key for a platform-delivered event.
pub fn event_key(tenant_id: Uuid, webhook_event_id: &str) -> String {
    format!("{tenant_id}:{webhook_event_id}")
}

/// Content-level dedup key for social-style ingestion, where the
/// platform supplies no stable event id.
pub fn content_key(title: &str, url: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    hasher.update(date.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct PgDedupStore {
    pool: PgPool,
}

impl PgDedupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupStore for PgDedupStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM processed_events WHERE event_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn mark(&self, key: &str, tenant_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_events (event_key, tenant_id)
            VALUES ($1, $2)
            ON CONFLICT (event_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

//! Tenant lookup.
//!
//! Tenants are owned by the configuration service; this pipeline only
//! resolves them by the platform's routing identifier. Lookups go
//! through an injected TTL cache so a burst of webhooks doesn't hammer
//! the tenants table; a miss is always safe, just slower.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::kernel::cache::TtlCache;

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    /// Platform-supplied routing identifier (the webhook `destination`).
    pub channel_id: String,
    /// HMAC secret for webhook signature verification.
    pub channel_secret: String,
    pub project_id: Uuid,
    /// Destination for payloads that bypass the rule engine.
    pub default_destination_id: String,
    /// Send the optimistic "received" reply back to the chat.
    pub reply_enabled: bool,
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_channel(&self, channel_id: &str) -> Result<Option<Tenant>>;
}

pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_by_channel(&self, channel_id: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, channel_id, channel_secret, project_id,
                   default_destination_id, reply_enabled
            FROM tenants
            WHERE channel_id = $1
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }
}

/// Caching wrapper around any directory. Negative results are not
/// cached: an unknown channel stays a cheap indexed miss.
pub struct CachingTenantDirectory {
    inner: Arc<dyn TenantDirectory>,
    cache: Arc<TtlCache<Tenant>>,
    ttl: Duration,
}

impl CachingTenantDirectory {
    pub fn new(inner: Arc<dyn TenantDirectory>, cache: Arc<TtlCache<Tenant>>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl TenantDirectory for CachingTenantDirectory {
    async fn find_by_channel(&self, channel_id: &str) -> Result<Option<Tenant>> {
        if let Some(tenant) = self.cache.get(channel_id) {
            return Ok(Some(tenant));
        }

        let tenant = self.inner.find_by_channel(channel_id).await?;
        if let Some(tenant) = &tenant {
            self.cache.put(channel_id, tenant.clone(), self.ttl);
        }
        Ok(tenant)
    }
}

//! Test doubles for the configuration collaborators, plus a builder
//! that assembles a fully in-memory `ServerDeps`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::domains::rules::{Rule, RuleSource};
use crate::domains::tenants::{Tenant, TenantDirectory};
use crate::kernel::jobs::testing::{
    InMemoryDedupStore, InMemoryJobStore, RecordingWriter, StaticMessagingClient,
};
use crate::kernel::metrics::RecordingMetrics;
use crate::kernel::ServerDeps;

/// Directory backed by a fixed set of tenants.
#[derive(Default)]
pub struct StaticTenantDirectory {
    tenants: HashMap<String, Tenant>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            tenants: tenants
                .into_iter()
                .map(|t| (t.channel_id.clone(), t))
                .collect(),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn find_by_channel(&self, channel_id: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(channel_id).cloned())
    }
}

/// Rule source backed by a fixed, priority-sorted rule list.
#[derive(Default)]
pub struct StaticRuleSource {
    rules: Vec<Rule>,
}

impl StaticRuleSource {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn active_rules(&self, project_id: Uuid) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.active && r.project_id == project_id)
            .cloned()
            .collect())
    }
}

/// Fully in-memory dependency set with handles kept for assertions.
pub struct TestDeps {
    pub deps: ServerDeps,
    pub job_store: Arc<InMemoryJobStore>,
    pub dedup: Arc<InMemoryDedupStore>,
    pub writer: Arc<RecordingWriter>,
    pub messaging: Arc<StaticMessagingClient>,
    pub metrics: Arc<RecordingMetrics>,
}

impl TestDeps {
    pub fn new(tenants: Vec<Tenant>, rules: Vec<Rule>) -> Self {
        Self::with_messaging(tenants, rules, StaticMessagingClient::new())
    }

    pub fn with_messaging(
        tenants: Vec<Tenant>,
        rules: Vec<Rule>,
        messaging: StaticMessagingClient,
    ) -> Self {
        let job_store = Arc::new(InMemoryJobStore::new());
        let dedup = Arc::new(InMemoryDedupStore::new());
        let writer = Arc::new(RecordingWriter::new());
        let messaging = Arc::new(messaging);
        let metrics = Arc::new(RecordingMetrics::new());

        let deps = ServerDeps {
            tenants: Arc::new(StaticTenantDirectory::new(tenants)),
            rules: Arc::new(StaticRuleSource::new(rules)),
            job_store: job_store.clone(),
            dedup: dedup.clone(),
            writer: writer.clone(),
            messaging: messaging.clone(),
            metrics: metrics.clone(),
        };

        Self {
            deps,
            job_store,
            dedup,
            writer,
            messaging,
            metrics,
        }
    }
}

/// A tenant fixture with sensible defaults.
pub fn test_tenant(channel_id: &str) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        channel_id: channel_id.to_string(),
        channel_secret: "test-channel-secret".to_string(),
        project_id: Uuid::new_v4(),
        default_destination_id: "default-db".to_string(),
        reply_enabled: false,
    }
}

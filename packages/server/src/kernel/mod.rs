//! Shared infrastructure: dependency wiring, cache, metrics, clients.

pub mod cache;
pub mod jobs;
pub mod messaging;
pub mod metrics;
pub mod testing;
pub mod writer;

use std::sync::Arc;

use crate::domains::rules::RuleSource;
use crate::domains::tenants::TenantDirectory;
use jobs::{DedupStore, JobStore};
use messaging::MessagingClient;
use metrics::MetricsSink;
use writer::PageWriter;

/// Everything the ingress handler and worker need, behind trait seams
/// so tests can swap any collaborator for an in-memory double.
#[derive(Clone)]
pub struct ServerDeps {
    pub tenants: Arc<dyn TenantDirectory>,
    pub rules: Arc<dyn RuleSource>,
    pub job_store: Arc<dyn JobStore>,
    pub dedup: Arc<dyn DedupStore>,
    pub writer: Arc<dyn PageWriter>,
    pub messaging: Arc<dyn MessagingClient>,
    pub metrics: Arc<dyn MetricsSink>,
}

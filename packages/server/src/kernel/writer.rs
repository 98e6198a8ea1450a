//! Downstream page writer.
//!
//! Thin seam over the notion client so the worker can be tested against
//! a recording double. The error type stays `NotionError` because the
//! worker classifies failures by HTTP status for metrics.

use async_trait::async_trait;
use notion::{NotionClient, NotionError, Properties};

#[async_trait]
pub trait PageWriter: Send + Sync {
    /// Create a page in the destination database; returns its opaque id.
    async fn write_page(
        &self,
        destination_id: &str,
        properties: Properties,
    ) -> Result<String, NotionError>;
}

#[async_trait]
impl PageWriter for NotionClient {
    async fn write_page(
        &self,
        destination_id: &str,
        properties: Properties,
    ) -> Result<String, NotionError> {
        self.create_page(destination_id, properties).await
    }
}

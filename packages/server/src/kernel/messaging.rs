//! Messaging platform client.
//!
//! Two concerns: the optional best-effort "received" reply sent back to
//! the chat, and fetching binary message content (images) at worker
//! time. Both go through a trait so tests can substitute a double.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Send a lightweight text reply using the platform's reply token.
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()>;

    /// Resolve a content URL for a media message.
    ///
    /// The platform stores media server-side, keyed by message id; the
    /// downstream write references it as an external file.
    async fn content_url(&self, provider_message_id: &str) -> Result<String>;
}

/// HTTP client for a LINE-style messaging API.
pub struct HttpMessagingClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMessagingClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingClient for HttpMessagingClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        let body = json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }],
        });

        let response = self
            .client
            .post(format!("{}/v2/bot/message/reply", self.base_url))
            .json(&body)
            .send()
            .await
            .context("reply request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("reply rejected with status {}", response.status());
        }
        Ok(())
    }

    async fn content_url(&self, provider_message_id: &str) -> Result<String> {
        // Content is addressable by message id; no fetch needed to build
        // the reference, but verify it resolves before handing it on.
        let url = format!(
            "{}/v2/bot/message/{}/content",
            self.base_url, provider_message_id
        );

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .context("content lookup failed")?;

        if !response.status().is_success() {
            anyhow::bail!("content for message {} unavailable", provider_message_id);
        }
        Ok(url)
    }
}

//! Minimal Notion API client for page creation.
//!
//! Only covers what the ingestion pipeline needs: creating a page in a
//! database with a typed property map. Errors preserve the HTTP status
//! so callers can distinguish rate limiting (429) from server errors
//! (5xx) for metrics.

pub mod models;

use reqwest::{header, Client};
use thiserror::Error;

pub use crate::models::{
    CreatePageRequest, CreatePageResponse, Parent, Properties, PropertyValue,
};

const API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Error)]
pub enum NotionError {
    /// The API rejected the request; status and Notion's error message.
    #[error("notion api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced an API response.
    #[error("notion request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl NotionError {
    /// HTTP-style status code, if the API answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            NotionError::Api { status, .. } => Some(*status),
            NotionError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }
}

#[derive(Debug, Clone)]
pub struct NotionOptions {
    pub api_token: String,
    /// Override the API base URL (tests, proxies).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NotionClient {
    options: NotionOptions,
    client: Client,
}

impl NotionClient {
    pub fn new(options: NotionOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    fn base_url(&self) -> &str {
        self.options.base_url.as_deref().unwrap_or(API_BASE)
    }

    /// Create a page in the given database.
    ///
    /// Returns the opaque id of the created page.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: Properties,
    ) -> Result<String, NotionError> {
        let request = CreatePageRequest {
            parent: Parent {
                database_id: database_id.to_string(),
            },
            properties,
        };

        let response = self
            .client
            .post(format!("{}/pages", self.base_url()))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.options.api_token))
            .header("Notion-Version", NOTION_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<models::ApiErrorBody>().await {
                Ok(body) if !body.message.is_empty() => body.message,
                Ok(body) => body.code,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            return Err(NotionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page: CreatePageResponse = response.json().await?;
        Ok(page.id)
    }
}

/// Convenience constructor for API errors, used by callers that need to
/// surface a synthetic status (test doubles, adapters).
pub fn api_error(status: u16, message: impl Into<String>) -> NotionError {
    NotionError::Api {
        status,
        message: message.into(),
    }
}

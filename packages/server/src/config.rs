use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub notion_api_token: String,
    /// Base URL of the messaging platform API (reply + content fetch).
    pub messaging_api_base: String,
    pub worker_batch_size: i64,
    pub worker_interval: Duration,
    pub tenant_cache_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            notion_api_token: env::var("NOTION_API_TOKEN")
                .context("NOTION_API_TOKEN must be set")?,
            messaging_api_base: env::var("MESSAGING_API_BASE")
                .unwrap_or_else(|_| "https://api.line.me".to_string()),
            worker_batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("WORKER_BATCH_SIZE must be a valid number")?,
            worker_interval: Duration::from_secs(
                env::var("WORKER_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("WORKER_INTERVAL_SECS must be a valid number")?,
            ),
            tenant_cache_ttl: Duration::from_secs(
                env::var("TENANT_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .context("TENANT_CACHE_TTL_SECS must be a valid number")?,
            ),
        })
    }
}

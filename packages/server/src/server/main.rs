// Main entry point for the webhook ingestion server

use std::sync::Arc;

use anyhow::{Context, Result};
use notion::{NotionClient, NotionOptions};
use server_core::domains::rules::PgRuleSource;
use server_core::domains::tenants::{CachingTenantDirectory, PgTenantDirectory};
use server_core::kernel::cache::TtlCache;
use server_core::kernel::jobs::{PgDedupStore, PgJobStore, Worker, WorkerConfig};
use server_core::kernel::messaging::HttpMessagingClient;
use server_core::kernel::metrics::TracingMetrics;
use server_core::kernel::ServerDeps;
use server_core::server::{build_app, AppState};
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting webhook ingestion server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Wire dependencies
    let tenants = Arc::new(CachingTenantDirectory::new(
        Arc::new(PgTenantDirectory::new(pool.clone())),
        Arc::new(TtlCache::new()),
        config.tenant_cache_ttl,
    ));
    let rules = Arc::new(PgRuleSource::new(pool.clone()));
    let job_store = Arc::new(PgJobStore::new(pool.clone()));
    let dedup = Arc::new(PgDedupStore::new(pool.clone()));
    let writer = Arc::new(NotionClient::new(NotionOptions {
        api_token: config.notion_api_token.clone(),
        base_url: None,
    }));
    let messaging = Arc::new(HttpMessagingClient::new(config.messaging_api_base.clone()));
    let metrics = Arc::new(TracingMetrics);

    let deps = ServerDeps {
        tenants,
        rules,
        job_store,
        dedup,
        writer,
        messaging,
        metrics,
    };

    let worker = Arc::new(
        Worker::new(
            deps.job_store.clone(),
            deps.dedup.clone(),
            deps.writer.clone(),
            deps.messaging.clone(),
            deps.metrics.clone(),
        )
        .with_config(WorkerConfig {
            batch_size: config.worker_batch_size,
            poll_interval: config.worker_interval,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }),
    );

    // Background delivery loop; /worker/run triggers extra batches on demand.
    tokio::spawn(worker.clone().run_forever());
    tracing::info!(
        interval_secs = config.worker_interval.as_secs(),
        batch_size = config.worker_batch_size,
        "Worker loop started"
    );

    // Build application
    let app = build_app(AppState::new(deps, worker, Some(pool)));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

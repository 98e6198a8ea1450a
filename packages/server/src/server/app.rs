//! Application setup and router wiring.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::kernel::jobs::Worker;
use crate::kernel::ServerDeps;
use crate::server::routes::{health_handler, webhook_handler, worker_run_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
    pub worker: Arc<Worker>,
    /// Present in production; absent when the stores are in-memory.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(deps: ServerDeps, worker: Arc<Worker>, db_pool: Option<PgPool>) -> Self {
        Self {
            deps,
            worker,
            db_pool,
        }
    }
}

/// Build the Axum application router.
///
/// `/webhooks/line` only registers POST, so other methods get the 405
/// the platform contract asks for.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/line", post(webhook_handler))
        .route("/worker/run", post(worker_run_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

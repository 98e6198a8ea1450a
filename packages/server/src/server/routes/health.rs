//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::kernel::jobs::JobStatus;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: String,
    queued_jobs: i64,
    dead_jobs: i64,
}

/// Returns 200 when the database answers, 503 otherwise. Queue depth
/// and dead-letter counts ride along for operators.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.db_pool {
        Some(pool) => match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sqlx::query("SELECT 1").execute(pool),
        )
        .await
        {
            Ok(Ok(_)) => "ok".to_string(),
            Ok(Err(e)) => format!("error: {e}"),
            Err(_) => "error: query timeout (>5s)".to_string(),
        },
        None => "skipped".to_string(),
    };

    let queued_jobs = state
        .deps
        .job_store
        .count_by_status(JobStatus::Queued)
        .await
        .unwrap_or(-1);
    let dead_jobs = state
        .deps
        .job_store
        .count_by_status(JobStatus::Dead)
        .await
        .unwrap_or(-1);

    let healthy = database == "ok" || database == "skipped";
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        database,
        queued_jobs,
        dead_jobs,
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

//! Manual worker trigger.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct WorkerRunResponse {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Run one worker batch now. Also invoked on a schedule; concurrent
/// invocations are safe because coordination lives in the job store's
/// claim protocol.
pub async fn worker_run_handler(
    State(state): State<AppState>,
) -> Result<Json<WorkerRunResponse>, StatusCode> {
    match state.worker.run_batch().await {
        Ok(summary) => Ok(Json(WorkerRunResponse {
            processed: summary.processed,
            succeeded: summary.succeeded,
            failed: summary.failed,
            duration_ms: summary.duration.as_millis() as u64,
        })),
        Err(e) => {
            tracing::error!(error = %e, "manual worker run failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

//! Inbound webhook route.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::domains::ingress::{handle_webhook, IngressResponse};
use crate::server::app::AppState;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Accept a webhook delivery.
///
/// The body is taken as raw bytes: signature verification must run over
/// exactly what the platform sent, so JSON parsing happens inside the
/// handler, after the tenant's secret is known.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match handle_webhook(&state.deps, signature, &body).await {
        IngressResponse::Ok => StatusCode::OK,
        IngressResponse::Unauthorized => StatusCode::UNAUTHORIZED,
    }
}

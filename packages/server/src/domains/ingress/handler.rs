//! Webhook ingestion.
//!
//! The handler's job is to acknowledge the platform fast: verify the
//! delivery, fan out over its sub-events, enqueue one job per usable
//! sub-event, and get out. The slow downstream write happens later in
//! the worker. Each step is a potential early exit, and per-sub-event
//! failures are isolated so one bad message never fails the request.

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::events::{InboundMessage, WebhookEvent, WebhookPayload};
use super::signature::verify_signature;
use crate::domains::rules::{mapping, match_rules};
use crate::domains::tenants::Tenant;
use crate::kernel::jobs::{dedup, EnqueueResult, Job, JobPayload};
use crate::kernel::metrics::counters;
use crate::kernel::ServerDeps;

/// What the HTTP layer should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressResponse {
    /// Processed (possibly zero sub-events). Also returned for unknown
    /// tenants and unparseable bodies: the platform must not retry a
    /// delivery this system can never satisfy.
    Ok,
    /// Signature missing or invalid.
    Unauthorized,
}

/// Per-sub-event outcome, for logging and metrics.
enum EventOutcome {
    Enqueued,
    Deduplicated,
    Skipped,
}

/// Handle one webhook delivery.
///
/// `body` must be the raw request bytes: the signature covers the exact
/// bytes the platform sent, and a re-serialized body may not match.
pub async fn handle_webhook(
    deps: &ServerDeps,
    signature_header: Option<&str>,
    body: &[u8],
) -> IngressResponse {
    let Some(signature) = signature_header else {
        return IngressResponse::Unauthorized;
    };

    let payload: WebhookPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "unparseable webhook body, dropping");
            return IngressResponse::Ok;
        }
    };

    let tenant = match deps.tenants.find_by_channel(&payload.destination).await {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            // Unknown tenant answers success: erroring here would put
            // the platform into an unwinnable retry loop.
            warn!(destination = %payload.destination, "webhook for unknown tenant, dropping");
            return IngressResponse::Ok;
        }
        Err(e) => {
            error!(destination = %payload.destination, error = %e, "tenant lookup failed");
            return IngressResponse::Ok;
        }
    };

    if !verify_signature(body, signature, tenant.channel_secret.as_bytes()) {
        warn!(tenant_id = %tenant.id, "webhook signature mismatch");
        return IngressResponse::Unauthorized;
    }

    // Sub-events are independent; process them concurrently and let
    // each fail on its own.
    let outcomes = join_all(
        payload
            .events
            .iter()
            .map(|event| process_event(deps, &tenant, event)),
    )
    .await;

    let enqueued = outcomes
        .iter()
        .filter(|o| matches!(o, EventOutcome::Enqueued))
        .count();
    info!(
        tenant_id = %tenant.id,
        events = payload.events.len(),
        enqueued,
        "webhook processed"
    );

    IngressResponse::Ok
}

/// Route one sub-event to a job. Never returns an error: enqueue
/// failures are logged and counted as skipped, because dedup makes the
/// platform's redelivery of this event safe.
async fn process_event(deps: &ServerDeps, tenant: &Tenant, event: &WebhookEvent) -> EventOutcome {
    if event.event_type != "message" {
        return EventOutcome::Skipped;
    }
    let Some(message) = &event.message else {
        return EventOutcome::Skipped;
    };

    let event_key = dedup::event_key(tenant.id, &message.id);
    match deps.dedup.exists(&event_key).await {
        Ok(true) => {
            debug!(event_key = %event_key, "event already processed, skipping");
            deps.metrics.incr(counters::EVENTS_DEDUPLICATED);
            return EventOutcome::Deduplicated;
        }
        Ok(false) => {}
        Err(e) => {
            // Fail open: the unique job index and the worker-side
            // marker still prevent a duplicate downstream write.
            warn!(event_key = %event_key, error = %e, "dedup lookup failed, continuing");
        }
    }

    let Some((destination_id, payload)) = build_payload(deps, tenant, message).await else {
        return EventOutcome::Skipped;
    };

    let job = Job::enqueued(tenant.id, message.id.clone(), destination_id, payload);
    match deps.job_store.enqueue(job).await {
        Ok(EnqueueResult::Created) => {
            deps.metrics.incr(counters::EVENTS_ENQUEUED);
            maybe_acknowledge(deps, tenant, event).await;
            EventOutcome::Enqueued
        }
        Ok(EnqueueResult::Duplicate) => {
            debug!(event_key = %event_key, "job already enqueued for event");
            deps.metrics.incr(counters::EVENTS_DEDUPLICATED);
            EventOutcome::Deduplicated
        }
        Err(e) => {
            error!(event_key = %event_key, error = %e, "failed to enqueue job");
            EventOutcome::Skipped
        }
    }
}

/// Build the job payload for a message, or `None` for unsupported kinds.
async fn build_payload(
    deps: &ServerDeps,
    tenant: &Tenant,
    message: &InboundMessage,
) -> Option<(String, JobPayload)> {
    match message.message_type.as_str() {
        "text" => {
            let text = message.text.as_deref()?;
            let rules = match deps.rules.active_rules(tenant.project_id).await {
                Ok(rules) => rules,
                Err(e) => {
                    error!(tenant_id = %tenant.id, error = %e, "rule fetch failed");
                    Vec::new()
                }
            };

            match match_rules(text, &rules) {
                Some(decision) => {
                    let properties =
                        mapping::build_text_properties(&decision, chrono::Utc::now());
                    Some((
                        decision.destination_id.clone(),
                        JobPayload::Text {
                            text: decision.cleaned_text,
                            properties,
                        },
                    ))
                }
                // Unmatched text is still captured, to the tenant's
                // default destination with the default mapping.
                None => {
                    let decision = crate::domains::rules::RouteDecision {
                        destination_id: tenant.default_destination_id.clone(),
                        cleaned_text: text.to_string(),
                        mapping: Default::default(),
                    };
                    let properties =
                        mapping::build_text_properties(&decision, chrono::Utc::now());
                    Some((
                        decision.destination_id,
                        JobPayload::Text {
                            text: text.to_string(),
                            properties,
                        },
                    ))
                }
            }
        }
        "image" => Some((
            tenant.default_destination_id.clone(),
            JobPayload::ImageRef {
                provider_message_id: message.id.clone(),
            },
        )),
        "location" => Some((
            tenant.default_destination_id.clone(),
            JobPayload::Location {
                title: message.title.clone(),
                address: message.address.clone(),
                latitude: message.latitude.unwrap_or_default(),
                longitude: message.longitude.unwrap_or_default(),
            },
        )),
        other => {
            debug!(message_type = %other, "unsupported message kind, dropping");
            None
        }
    }
}

/// Optimistic "received" reply. Strictly best-effort: a failure here
/// must never affect ingestion, so it is logged and swallowed.
async fn maybe_acknowledge(deps: &ServerDeps, tenant: &Tenant, event: &WebhookEvent) {
    if !tenant.reply_enabled {
        return;
    }
    let Some(reply_token) = &event.reply_token else {
        return;
    };
    if let Err(e) = deps
        .messaging
        .reply(reply_token, "Received, processing.")
        .await
    {
        warn!(tenant_id = %tenant.id, error = %e, "acknowledgment reply failed");
    }
}

// Common test utilities

use serde_json::json;
use server_core::domains::ingress::signature::{compute_signature, encode_signature};
use server_core::domains::tenants::Tenant;

/// Signature header value for a raw body, as the platform would send it.
pub fn sign(body: &[u8], secret: &str) -> String {
    encode_signature(&compute_signature(body, secret.as_bytes()))
}

/// A single-event webhook body carrying one text message.
pub fn text_message_body(tenant: &Tenant, message_id: &str, text: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "destination": tenant.channel_id,
        "events": [{
            "type": "message",
            "replyToken": format!("rt-{message_id}"),
            "message": {"id": message_id, "type": "text", "text": text}
        }]
    }))
    .expect("body serializes")
}

/// A webhook body with an arbitrary set of events.
pub fn webhook_body(destination: &str, events: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "destination": destination,
        "events": events
    }))
    .expect("body serializes")
}

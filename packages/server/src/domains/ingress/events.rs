//! Inbound webhook payload types.
//!
//! The platform delivers a batch of events per request. Only `message`
//! events are processed; within those, only text, image, and location
//! kinds. Everything else deserializes fine and is silently dropped, so
//! new platform event kinds never break ingestion.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Routing identifier for the receiving channel.
    pub destination: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<InboundMessage>,
}

/// A message sub-event. The kind is an open string so unsupported
/// kinds (sticker, video, ...) parse and are dropped downstream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_message_event() {
        let payload: WebhookPayload = serde_json::from_str(
            r##"{
                "destination": "chan-1",
                "events": [{
                    "type": "message",
                    "replyToken": "rt-1",
                    "message": {"id": "m-1", "type": "text", "text": "#todo buy milk"}
                }]
            }"##,
        )
        .unwrap();
        assert_eq!(payload.destination, "chan-1");
        let message = payload.events[0].message.as_ref().unwrap();
        assert_eq!(message.message_type, "text");
        assert_eq!(message.text.as_deref(), Some("#todo buy milk"));
    }

    #[test]
    fn unknown_message_kind_still_parses() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{
                "destination": "chan-1",
                "events": [{
                    "type": "message",
                    "message": {"id": "m-2", "type": "sticker"}
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(
            payload.events[0].message.as_ref().unwrap().message_type,
            "sticker"
        );
    }

    #[test]
    fn missing_events_defaults_to_empty() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"destination": "chan-1"}"#).unwrap();
        assert!(payload.events.is_empty());
    }
}

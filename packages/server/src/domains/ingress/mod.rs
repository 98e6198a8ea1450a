pub mod events;
pub mod handler;
pub mod signature;

pub use events::{InboundMessage, WebhookEvent, WebhookPayload};
pub use handler::{handle_webhook, IngressResponse};

//! Messaging→document ingestion pipeline.
//!
//! Receives chat-platform webhooks, routes messages through per-project
//! rules, and durably queues one job per message so the slow downstream
//! document write never blocks the platform's acknowledgment window. A
//! worker drains the queue with an atomic claim protocol, retrying with
//! backoff and dead-lettering jobs that exhaust their budget.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;

pub mod health;
pub mod webhook;
pub mod worker;

pub use health::health_handler;
pub use webhook::webhook_handler;
pub use worker::worker_run_handler;

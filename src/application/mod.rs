//! Application layer - use-case orchestration over domain and ports.

mod process_webhook;

pub use process_webhook::{ProcessWebhookHandler, WebhookOutcome};

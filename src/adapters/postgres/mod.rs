//! PostgreSQL adapters over the persistence ports.

mod record_store;
mod webhook_events;

pub use record_store::PostgresRecordStore;
pub use webhook_events::PostgresWebhookEventRepository;

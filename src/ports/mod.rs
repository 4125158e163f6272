//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `RecordStore` - durable user/subscription/payment storage
//! - `WebhookEventRepository` - idempotency journal for deliveries
//! - `WalletGatewayClient` - wallet gateway payment-query API
//! - `UserNotifier` - user-facing entitlement notifications

mod notifier;
mod record_store;
mod wallet_gateway;
mod webhook_event_repository;

pub use notifier::{NotifyError, UserNotifier};
pub use record_store::RecordStore;
pub use wallet_gateway::{WalletFetchError, WalletGatewayClient};
pub use webhook_event_repository::{SaveResult, WebhookEventRecord, WebhookEventRepository};

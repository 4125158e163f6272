//! UserNotifier port - user-facing confirmation/failure messages.
//!
//! Fire-and-forget: the state change is already committed when the
//! notifier runs, and a delivery failure must never roll it back.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::billing::EntitlementChange;

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify(&self, change: &EntitlementChange) -> Result<(), NotifyError>;
}

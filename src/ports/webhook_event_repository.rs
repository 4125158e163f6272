//! WebhookEventRepository port - the idempotency guard's journal.
//!
//! Gateways redeliver notifications on any acknowledgment failure, so
//! every delivery is journaled under its idempotency key. A prior
//! record short-circuits processing; the PRIMARY KEY on
//! `(gateway, idempotency_key)` closes the check-then-act race when
//! two deliveries arrive concurrently.

use async_trait::async_trait;

use crate::domain::billing::Gateway;
use crate::domain::foundation::{StoreError, Timestamp};

/// Journal entry for one processed webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    pub gateway: Gateway,

    /// Deduplication key: the gateway payment id when the event
    /// carries one, else the gateway event id.
    pub idempotency_key: String,

    /// Canonical event kind string (e.g. "invoice_paid").
    pub event_kind: String,

    pub processed_at: Timestamp,

    /// Outcome: "applied", "pending", "ignored", or "unresolved".
    pub result: String,

    /// Detail for ignored/unresolved outcomes. Unresolved records form
    /// the manual-review queue.
    pub detail: Option<String>,

    /// Original payload, retained for audit and replay.
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn applied(
        gateway: Gateway,
        idempotency_key: impl Into<String>,
        event_kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            gateway,
            idempotency_key: idempotency_key.into(),
            event_kind: event_kind.into(),
            processed_at: Timestamp::now(),
            result: "applied".to_string(),
            detail: None,
            payload,
        }
    }

    /// A payment recorded in a not-yet-settled state. Unlike every
    /// other result, a pending record does not close the key: the
    /// gateway's next notification for it is reprocessed.
    pub fn pending(
        gateway: Gateway,
        idempotency_key: impl Into<String>,
        event_kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            gateway,
            idempotency_key: idempotency_key.into(),
            event_kind: event_kind.into(),
            processed_at: Timestamp::now(),
            result: "pending".to_string(),
            detail: None,
            payload,
        }
    }

    pub fn ignored(
        gateway: Gateway,
        idempotency_key: impl Into<String>,
        event_kind: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            gateway,
            idempotency_key: idempotency_key.into(),
            event_kind: event_kind.into(),
            processed_at: Timestamp::now(),
            result: "ignored".to_string(),
            detail: Some(reason.into()),
            payload,
        }
    }

    pub fn unresolved(
        gateway: Gateway,
        idempotency_key: impl Into<String>,
        event_kind: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            gateway,
            idempotency_key: idempotency_key.into(),
            event_kind: event_kind.into(),
            processed_at: Timestamp::now(),
            result: "unresolved".to_string(),
            detail: Some(reason.into()),
            payload,
        }
    }

    /// Whether this record closes its key. A settled record
    /// short-circuits redelivery; a pending one lets it through.
    pub fn is_settled(&self) -> bool {
        self.result != "pending"
    }
}

/// Result of attempting to journal a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First time seeing this key.
    Inserted,
    /// Another delivery already claimed the key.
    AlreadyExists,
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Looks up a prior delivery under the same key.
    async fn find(
        &self,
        gateway: Gateway,
        idempotency_key: &str,
    ) -> Result<Option<WebhookEventRecord>, StoreError>;

    /// Journals a delivery. Inserts under a new key, overwrites a
    /// prior `pending` record, and reports `AlreadyExists` when a
    /// settled record holds the key.
    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, StoreError>;

    /// Retention cleanup; returns the number of records deleted.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

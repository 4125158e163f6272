//! ProcessWebhookHandler - orchestrates one inbound webhook delivery.
//!
//! Pipeline per delivery: verify, normalize, consult the idempotency
//! journal, reconcile, journal the result, notify. Every outcome the
//! gateway must not redeliver (applied, duplicate, ignored, unresolved)
//! surfaces as `Ok`; only genuine boundary or infrastructure failures
//! bubble up as [`WebhookError`].

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::billing::{
    normalize_card, normalize_wallet, AuthError, CardSignatureVerifier, GatewayEvent,
    NormalizeError, ReconcileOutcome, ReconciliationEngine, WebhookError,
};
use crate::ports::{
    SaveResult, UserNotifier, WalletFetchError, WalletGatewayClient, WebhookEventRecord,
    WebhookEventRepository,
};

/// What the HTTP layer reports back to the gateway. All four variants
/// mean "acknowledged, do not redeliver".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State changed.
    Applied,
    /// Redelivery of an already-applied event.
    Duplicate,
    /// Recognized but nothing to do.
    Ignored,
    /// References could not be resolved; queued for manual review.
    Unresolved,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Unresolved => "unresolved",
        }
    }
}

/// Wallet notification body. Only the payment id is trusted; the
/// record itself is fetched back from the gateway.
#[derive(Debug, Deserialize)]
struct WalletNotification {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<WalletNotificationData>,
}

#[derive(Debug, Deserialize)]
struct WalletNotificationData {
    id: Option<serde_json::Value>,
}

impl WalletNotification {
    /// The gateway sends the id as a number or a string depending on
    /// notification channel.
    fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub struct ProcessWebhookHandler {
    card_verifier: CardSignatureVerifier,
    wallet_client: Arc<dyn WalletGatewayClient>,
    engine: ReconciliationEngine,
    webhook_events: Arc<dyn WebhookEventRepository>,
    notifier: Arc<dyn UserNotifier>,
}

impl ProcessWebhookHandler {
    pub fn new(
        card_verifier: CardSignatureVerifier,
        wallet_client: Arc<dyn WalletGatewayClient>,
        engine: ReconciliationEngine,
        webhook_events: Arc<dyn WebhookEventRepository>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            card_verifier,
            wallet_client,
            engine,
            webhook_events,
            notifier,
        }
    }

    /// Handles a card-gateway delivery: signature first, on the raw
    /// unparsed body, before anything trusts payload structure.
    pub async fn process_card(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature_header = signature_header.ok_or(AuthError::MissingSignature)?;
        self.card_verifier.verify(payload, signature_header)?;

        let event = normalize_card(payload)?;
        self.apply(event).await
    }

    /// Handles a wallet-gateway delivery. The notification is a
    /// poke-to-refetch: only the payment id is read from it, and the
    /// authoritative record comes from the gateway's query API.
    pub async fn process_wallet(&self, payload: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        let notification: WalletNotification =
            serde_json::from_slice(payload).map_err(NormalizeError::from)?;

        if let Some(kind) = notification.kind.as_deref() {
            if kind != "payment" {
                info!(kind, "wallet notification for non-payment topic, ignoring");
                return Ok(WebhookOutcome::Ignored);
            }
        }

        let payment_id = notification.payment_id().ok_or_else(|| {
            NormalizeError::MalformedPayload {
                kind: "wallet_notification",
                reason: "data.id missing".to_string(),
            }
        })?;

        let payment = self
            .wallet_client
            .fetch_payment(&payment_id)
            .await
            .map_err(|err| match err {
                WalletFetchError::NotFound(id) => AuthError::NotFound(id),
                WalletFetchError::Unreachable(reason) => AuthError::GatewayUnreachable(reason),
            })?;

        let event = normalize_wallet(&payment)?;
        self.apply(event).await
    }

    /// The gateway-independent tail of the pipeline: idempotency
    /// guard, engine, journal, notification.
    async fn apply(&self, event: GatewayEvent) -> Result<WebhookOutcome, WebhookError> {
        // Degenerate payloads that identify nothing skip the journal;
        // they cannot be deduplicated and never mutate state.
        let Some(key) = event.idempotency_key().map(str::to_string) else {
            info!(gateway = %event.gateway, kind = event.kind.as_str(), "event carries no id, acknowledging");
            return Ok(WebhookOutcome::Ignored);
        };

        if let Some(prior) = self.webhook_events.find(event.gateway, &key).await? {
            if prior.is_settled() {
                info!(
                    gateway = %event.gateway,
                    idempotency_key = %key,
                    prior_result = %prior.result,
                    "duplicate delivery, short-circuiting"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
            // A pending payment may have settled since; run it again.
            info!(
                gateway = %event.gateway,
                idempotency_key = %key,
                "redelivery of a pending payment, reprocessing"
            );
        }

        let outcome = self.engine.reconcile(&event).await?;

        let (webhook_outcome, record, change) = match outcome {
            ReconcileOutcome::Applied(change) => (
                WebhookOutcome::Applied,
                WebhookEventRecord::applied(
                    event.gateway,
                    &key,
                    event.kind.as_str(),
                    event.raw_payload.clone(),
                ),
                change,
            ),
            ReconcileOutcome::Pending => (
                WebhookOutcome::Applied,
                WebhookEventRecord::pending(
                    event.gateway,
                    &key,
                    event.kind.as_str(),
                    event.raw_payload.clone(),
                ),
                None,
            ),
            ReconcileOutcome::Duplicate => {
                // The racing delivery owns the journal entry.
                return Ok(WebhookOutcome::Duplicate);
            }
            ReconcileOutcome::Unresolved(reason) => {
                warn!(
                    gateway = %event.gateway,
                    idempotency_key = %key,
                    kind = event.kind.as_str(),
                    reason = %reason,
                    "event unresolved, queued for manual review"
                );
                (
                    WebhookOutcome::Unresolved,
                    WebhookEventRecord::unresolved(
                        event.gateway,
                        &key,
                        event.kind.as_str(),
                        reason,
                        event.raw_payload.clone(),
                    ),
                    None,
                )
            }
            ReconcileOutcome::NoOp(reason) => (
                WebhookOutcome::Ignored,
                WebhookEventRecord::ignored(
                    event.gateway,
                    &key,
                    event.kind.as_str(),
                    reason,
                    event.raw_payload.clone(),
                ),
                None,
            ),
        };

        if self.webhook_events.save(record).await? == SaveResult::AlreadyExists {
            // Lost the journal race after reconciling; the store's own
            // constraints kept state single-application.
            return Ok(WebhookOutcome::Duplicate);
        }

        // Best-effort: a failed notification never rolls back the
        // committed state change.
        if let Some(change) = change {
            if let Err(err) = self.notifier.notify(&change).await {
                warn!(
                    user_id = %change.user_id,
                    error = %err,
                    "entitlement notification failed"
                );
            }
        }

        info!(
            gateway = %event.gateway,
            kind = event.kind.as_str(),
            idempotency_key = %key,
            outcome = webhook_outcome.as_str(),
            "webhook processed"
        );
        Ok(webhook_outcome)
    }
}

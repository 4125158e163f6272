//! Reconciliation engine - the subscription lifecycle state machine.
//!
//! Given a canonical event and current stored state, computes the new
//! `Subscription`/`Payment`/`User` state plus the entitlement change to
//! announce. All writes for one event go through a single atomic
//! [`MutationSet`]; the engine is the only writer to the record store.
//!
//! Business-logic mismatches never raise: an event for an already
//! canceled subscription is a logged no-op, since gateways redeliver
//! late events and re-applying a terminal state is harmless.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::foundation::{ChatId, StoreError, UserId};
use crate::ports::RecordStore;

use super::event::{EventKind, GatewayEvent};
use super::payment::Payment;
use super::status::{BillingPeriod, EntitlementStatus, PaymentStatus, SubscriptionStatus};
use super::subscription::Subscription;
use super::tier::Tier;
use super::user::User;

/// The creates/updates computed for one event, applied atomically.
#[derive(Debug, Clone, Default)]
pub struct MutationSet {
    pub create_payment: Option<Payment>,
    pub update_payment: Option<Payment>,
    pub create_subscription: Option<Subscription>,
    pub update_subscription: Option<Subscription>,
    pub update_user: Option<User>,
}

impl MutationSet {
    pub fn is_empty(&self) -> bool {
        self.create_payment.is_none()
            && self.update_payment.is_none()
            && self.create_subscription.is_none()
            && self.update_subscription.is_none()
            && self.update_user.is_none()
    }
}

/// What happened to a user's entitlement, for the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementChangeKind {
    /// Tier granted after a completed checkout.
    Granted,
    /// Billing cycle paid; a past-due entitlement was restored.
    Renewed,
    /// Payment failed; entitlement in grace, tier retained.
    PastDue,
    /// Subscription canceled; entitlement removed.
    Revoked,
}

#[derive(Debug, Clone)]
pub struct EntitlementChange {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub tier: Tier,
    pub status: EntitlementStatus,
    pub kind: EntitlementChangeKind,
}

impl EntitlementChange {
    fn from_user(user: &User, kind: EntitlementChangeKind) -> Self {
        Self {
            user_id: user.id,
            chat_id: user.chat_id,
            tier: user.tier,
            status: user.status,
            kind,
        }
    }
}

/// Outcome of reconciling one event.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// State committed; carries the entitlement change, if any.
    Applied(Option<EntitlementChange>),
    /// Payment recorded in a not-yet-settled state. The delivery stays
    /// reprocessable so a later notification for the same payment id
    /// can settle it.
    Pending,
    /// The store's uniqueness backstop fired: another delivery already
    /// applied this event.
    Duplicate,
    /// A precondition reference could not be resolved. Recorded for
    /// manual review, acknowledged to the gateway.
    Unresolved(String),
    /// Nothing to do (ignored kind, terminal state, non-settled
    /// payment with no entitlement effect).
    NoOp(&'static str),
}

/// The state machine core. Reads fresh state per event, computes one
/// mutation set, commits it atomically.
pub struct ReconciliationEngine {
    store: Arc<dyn RecordStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, StoreError> {
        match event.kind {
            EventKind::CheckoutCompleted => self.on_checkout_completed(event).await,
            EventKind::InvoicePaid => self.on_invoice_paid(event).await,
            EventKind::InvoicePaymentFailed => self.on_invoice_payment_failed(event).await,
            EventKind::SubscriptionUpdated => self.on_subscription_updated(event).await,
            EventKind::SubscriptionCanceled => self.on_subscription_canceled(event).await,
            EventKind::Ignored => Ok(ReconcileOutcome::NoOp("ignored event kind")),
        }
    }

    // ── checkout_completed ────────────────────────────────────────

    async fn on_checkout_completed(
        &self,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        let Some(user_id) = event.user_reference else {
            return Ok(ReconcileOutcome::Unresolved(
                "checkout carries no user reference".to_string(),
            ));
        };
        let Some(user) = self.store.get_user(&user_id).await? else {
            return Ok(ReconcileOutcome::Unresolved(format!(
                "no user {user_id} on record"
            )));
        };
        let Some(payment_id) = event.external_payment_id.as_deref() else {
            return Ok(ReconcileOutcome::Unresolved(
                "checkout carries no payment id".to_string(),
            ));
        };

        // The wallet gateway re-notifies the same payment id on status
        // changes, so an existing row means a settlement update, not a
        // new charge.
        if let Some(existing) = self.store.get_payment(event.gateway, payment_id).await? {
            return self.settle_recorded_payment(existing, event).await;
        }

        let tier = event.tier.unwrap_or(Tier::Basic);
        let billing_period = if event.recurring {
            BillingPeriod::Monthly
        } else {
            BillingPeriod::OneTime
        };

        let mut mutations = MutationSet::default();
        let mut subscription_id = None;

        // Recurring checkout opens the billing agreement, unless a
        // redelivery under a different payment id already did.
        if event.recurring {
            if let Some(ext_sub_id) = event.external_subscription_id.as_deref() {
                match self.store.get_subscription(event.gateway, ext_sub_id).await? {
                    Some(existing) => subscription_id = Some(existing.id),
                    None => {
                        let subscription = Subscription::new_active(
                            user.id,
                            event.gateway,
                            ext_sub_id,
                            tier,
                            event.amount.unwrap_or(Decimal::ZERO),
                            event.currency.clone().unwrap_or_else(|| "usd".to_string()),
                        );
                        subscription_id = Some(subscription.id);
                        mutations.create_subscription = Some(subscription);
                    }
                }
            }
        }

        mutations.create_payment = Some(
            Payment::new(
                user.id,
                subscription_id,
                event.gateway,
                payment_id,
                event.amount.unwrap_or(Decimal::ZERO),
                event.currency.clone().unwrap_or_else(|| "usd".to_string()),
                event.payment_status,
                tier,
                billing_period,
                event.raw_payload.clone(),
            )
            .with_customer_id(event.external_customer_id.clone()),
        );

        // A payment that never settled records the attempt but grants
        // nothing. A still-pending one keeps its delivery reprocessable.
        if event.payment_status != PaymentStatus::Completed {
            info!(
                gateway = %event.gateway,
                payment_id,
                status = event.payment_status.as_str(),
                "checkout payment not settled, recording without grant"
            );
            let outcome = self.commit(mutations, None).await?;
            if event.payment_status == PaymentStatus::Pending {
                if let ReconcileOutcome::Applied(_) = outcome {
                    return Ok(ReconcileOutcome::Pending);
                }
            }
            return Ok(outcome);
        }

        let mut user = user;
        user.grant(tier);
        let change = EntitlementChange::from_user(&user, EntitlementChangeKind::Granted);
        mutations.update_user = Some(user);

        self.commit(mutations, Some(change)).await
    }

    /// A checkout event whose payment id is already on record: a plain
    /// redelivery when the row is settled, or the gateway reporting the
    /// outcome of a pending payment.
    async fn settle_recorded_payment(
        &self,
        mut payment: Payment,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        if payment.status != PaymentStatus::Pending {
            return Ok(ReconcileOutcome::Duplicate);
        }
        if event.payment_status == PaymentStatus::Pending {
            return Ok(ReconcileOutcome::Pending);
        }

        payment.settle(event.payment_status);
        info!(
            gateway = %event.gateway,
            payment_id = %payment.gateway_payment_id,
            status = payment.status.as_str(),
            "pending payment settled"
        );

        let mut mutations = MutationSet::default();
        let mut change = None;
        if payment.status == PaymentStatus::Completed {
            if let Some(mut user) = self.store.get_user(&payment.user_id).await? {
                user.grant(payment.product_tier);
                change = Some(EntitlementChange::from_user(
                    &user,
                    EntitlementChangeKind::Granted,
                ));
                mutations.update_user = Some(user);
            }
        }
        mutations.update_payment = Some(payment);

        self.commit(mutations, change).await
    }

    // ── invoice_paid ──────────────────────────────────────────────

    async fn on_invoice_paid(&self, event: &GatewayEvent) -> Result<ReconcileOutcome, StoreError> {
        let Some(ext_sub_id) = event.external_subscription_id.as_deref() else {
            return Ok(ReconcileOutcome::Unresolved(
                "invoice carries no subscription reference".to_string(),
            ));
        };
        let Some(mut subscription) =
            self.store.get_subscription(event.gateway, ext_sub_id).await?
        else {
            return Ok(ReconcileOutcome::Unresolved(format!(
                "no subscription {ext_sub_id} on record"
            )));
        };
        if subscription.is_canceled() {
            return Ok(ReconcileOutcome::NoOp("subscription is canceled"));
        }
        let Some(payment_id) = event.external_payment_id.as_deref() else {
            return Ok(ReconcileOutcome::Unresolved(
                "invoice carries no payment id".to_string(),
            ));
        };

        let mut mutations = MutationSet::default();

        mutations.create_payment = Some(
            Payment::new(
                subscription.user_id,
                Some(subscription.id),
                event.gateway,
                payment_id,
                event.amount.unwrap_or(subscription.amount),
                event
                    .currency
                    .clone()
                    .unwrap_or_else(|| subscription.currency.clone()),
                PaymentStatus::Completed,
                subscription.tier,
                BillingPeriod::Monthly,
                event.raw_payload.clone(),
            )
            .with_customer_id(event.external_customer_id.clone()),
        );

        let was_past_due = subscription.status == SubscriptionStatus::PastDue;
        subscription.refresh_period(event.period_start, event.period_end);

        let mut change = None;
        if was_past_due {
            subscription.restore_active();
            if let Some(mut user) = self.store.get_user(&subscription.user_id).await? {
                user.restore();
                change = Some(EntitlementChange::from_user(
                    &user,
                    EntitlementChangeKind::Renewed,
                ));
                mutations.update_user = Some(user);
            }
        }
        mutations.update_subscription = Some(subscription);

        self.commit(mutations, change).await
    }

    // ── invoice_payment_failed ────────────────────────────────────

    async fn on_invoice_payment_failed(
        &self,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        let Some(mut subscription) = self.resolve_subscription(event).await? else {
            return self.unresolved_subscription(event);
        };
        if subscription.is_canceled() {
            return Ok(ReconcileOutcome::NoOp("subscription is canceled"));
        }

        subscription.mark_past_due();

        let mut mutations = MutationSet::default();
        let mut change = None;
        // Tier stays during the grace period; only status moves.
        if let Some(mut user) = self.store.get_user(&subscription.user_id).await? {
            user.mark_past_due();
            change = Some(EntitlementChange::from_user(
                &user,
                EntitlementChangeKind::PastDue,
            ));
            mutations.update_user = Some(user);
        }
        mutations.update_subscription = Some(subscription);

        self.commit(mutations, change).await
    }

    // ── subscription_updated ──────────────────────────────────────

    async fn on_subscription_updated(
        &self,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        let Some(mut subscription) = self.resolve_subscription(event).await? else {
            return self.unresolved_subscription(event);
        };
        if subscription.is_canceled() {
            return Ok(ReconcileOutcome::NoOp("subscription is canceled"));
        }

        // Status and period are copied forward verbatim. Entitlement
        // effects come from the other event kinds.
        if let Some(status) = event.subscription_status {
            subscription.status = status;
        }
        subscription.refresh_period(event.period_start, event.period_end);
        if let Some(cancel_at_period_end) = event.cancel_at_period_end {
            subscription.cancel_at_period_end = cancel_at_period_end;
        }

        let mutations = MutationSet {
            update_subscription: Some(subscription),
            ..MutationSet::default()
        };
        self.commit(mutations, None).await
    }

    // ── subscription_canceled ─────────────────────────────────────

    async fn on_subscription_canceled(
        &self,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        let Some(mut subscription) = self.resolve_subscription(event).await? else {
            return self.unresolved_subscription(event);
        };
        if subscription.is_canceled() {
            return Ok(ReconcileOutcome::NoOp("subscription already canceled"));
        }

        subscription.cancel();

        let mut mutations = MutationSet::default();
        let mut change = None;
        if let Some(mut user) = self.store.get_user(&subscription.user_id).await? {
            user.revoke();
            change = Some(EntitlementChange::from_user(
                &user,
                EntitlementChangeKind::Revoked,
            ));
            mutations.update_user = Some(user);
        }
        mutations.update_subscription = Some(subscription);

        self.commit(mutations, change).await
    }

    // ── shared plumbing ───────────────────────────────────────────

    async fn resolve_subscription(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<Subscription>, StoreError> {
        let Some(ext_sub_id) = event.external_subscription_id.as_deref() else {
            return Ok(None);
        };
        self.store.get_subscription(event.gateway, ext_sub_id).await
    }

    fn unresolved_subscription(
        &self,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        let reference = event
            .external_subscription_id
            .as_deref()
            .unwrap_or("<none>");
        Ok(ReconcileOutcome::Unresolved(format!(
            "no subscription {reference} on record"
        )))
    }

    /// Commits the mutation set. The store's uniqueness constraints
    /// are the final backstop against racing duplicate deliveries:
    /// a constraint hit means the other delivery won, not a failure.
    async fn commit(
        &self,
        mutations: MutationSet,
        change: Option<EntitlementChange>,
    ) -> Result<ReconcileOutcome, StoreError> {
        if mutations.is_empty() {
            return Ok(ReconcileOutcome::NoOp("no mutations computed"));
        }
        match self.store.apply(mutations).await {
            Ok(()) => Ok(ReconcileOutcome::Applied(change)),
            Err(StoreError::Duplicate { entity }) => {
                warn!(entity, "uniqueness backstop hit, treating as duplicate delivery");
                Ok(ReconcileOutcome::Duplicate)
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::domain::billing::Gateway;
    use crate::domain::foundation::Timestamp;

    // ══════════════════════════════════════════════════════════════
    // In-memory record store
    // ══════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct InMemoryRecordStore {
        users: RwLock<HashMap<UserId, User>>,
        subscriptions: RwLock<HashMap<(Gateway, String), Subscription>>,
        payments: RwLock<HashMap<(Gateway, String), Payment>>,
    }

    impl InMemoryRecordStore {
        async fn seed_user(&self, user: User) {
            self.users.write().await.insert(user.id, user);
        }

        async fn seed_subscription(&self, subscription: Subscription) {
            self.subscriptions.write().await.insert(
                (
                    subscription.gateway,
                    subscription.gateway_subscription_id.clone(),
                ),
                subscription,
            );
        }

        async fn payment_count(&self) -> usize {
            self.payments.read().await.len()
        }

        async fn payment(&self, gateway: Gateway, ext_id: &str) -> Payment {
            self.payments
                .read()
                .await
                .get(&(gateway, ext_id.to_string()))
                .cloned()
                .unwrap()
        }

        async fn user(&self, id: &UserId) -> User {
            self.users.read().await.get(id).cloned().unwrap()
        }

        async fn subscription(&self, gateway: Gateway, ext_id: &str) -> Subscription {
            self.subscriptions
                .read()
                .await
                .get(&(gateway, ext_id.to_string()))
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl RecordStore for InMemoryRecordStore {
        async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
            Ok(self.users.read().await.get(id).cloned())
        }

        async fn get_subscription(
            &self,
            gateway: Gateway,
            gateway_subscription_id: &str,
        ) -> Result<Option<Subscription>, StoreError> {
            Ok(self
                .subscriptions
                .read()
                .await
                .get(&(gateway, gateway_subscription_id.to_string()))
                .cloned())
        }

        async fn get_payment(
            &self,
            gateway: Gateway,
            gateway_payment_id: &str,
        ) -> Result<Option<Payment>, StoreError> {
            Ok(self
                .payments
                .read()
                .await
                .get(&(gateway, gateway_payment_id.to_string()))
                .cloned())
        }

        async fn apply(&self, mutations: MutationSet) -> Result<(), StoreError> {
            if let Some(payment) = &mutations.create_payment {
                let key = (payment.gateway, payment.gateway_payment_id.clone());
                if self.payments.read().await.contains_key(&key) {
                    return Err(StoreError::duplicate("payment"));
                }
            }
            if let Some(payment) = mutations.create_payment {
                self.payments
                    .write()
                    .await
                    .insert((payment.gateway, payment.gateway_payment_id.clone()), payment);
            }
            if let Some(payment) = mutations.update_payment {
                self.payments
                    .write()
                    .await
                    .insert((payment.gateway, payment.gateway_payment_id.clone()), payment);
            }
            if let Some(subscription) = mutations.create_subscription {
                self.seed_subscription(subscription).await;
            }
            if let Some(subscription) = mutations.update_subscription {
                self.seed_subscription(subscription).await;
            }
            if let Some(user) = mutations.update_user {
                self.users.write().await.insert(user.id, user);
            }
            Ok(())
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Fixtures
    // ══════════════════════════════════════════════════════════════

    fn engine_with_store() -> (ReconciliationEngine, Arc<InMemoryRecordStore>) {
        let store = Arc::new(InMemoryRecordStore::default());
        (ReconciliationEngine::new(store.clone()), store)
    }

    fn test_user() -> User {
        User::new(UserId::new(), ChatId::new(42))
    }

    fn recurring_checkout(user_id: UserId) -> GatewayEvent {
        let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::CheckoutCompleted);
        event.external_event_id = Some("evt_checkout".to_string());
        event.external_payment_id = Some("pi_checkout".to_string());
        event.external_subscription_id = Some("sub_1".to_string());
        event.user_reference = Some(user_id);
        event.tier = Some(Tier::Pro);
        event.amount = Some(Decimal::new(2900, 2));
        event.currency = Some("usd".to_string());
        event.recurring = true;
        event
    }

    fn invoice_paid() -> GatewayEvent {
        let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::InvoicePaid);
        event.external_event_id = Some("evt_invoice".to_string());
        event.external_payment_id = Some("pi_invoice".to_string());
        event.external_subscription_id = Some("sub_1".to_string());
        event.amount = Some(Decimal::new(2900, 2));
        event.currency = Some("usd".to_string());
        event.period_start = Some(Timestamp::from_unix_secs(1704067200));
        event.period_end = Some(Timestamp::from_unix_secs(1706745600));
        event.recurring = true;
        event
    }

    fn subscription_event(kind: EventKind) -> GatewayEvent {
        let mut event = GatewayEvent::of_kind(Gateway::Card, kind);
        event.external_event_id = Some("evt_sub".to_string());
        event.external_subscription_id = Some("sub_1".to_string());
        event.recurring = true;
        event
    }

    async fn seeded_subscription(
        store: &InMemoryRecordStore,
        status: SubscriptionStatus,
    ) -> User {
        let user = test_user();
        let mut granted = user.clone();
        granted.grant(Tier::Pro);
        store.seed_user(granted.clone()).await;

        let mut subscription = Subscription::new_active(
            user.id,
            Gateway::Card,
            "sub_1",
            Tier::Pro,
            Decimal::new(2900, 2),
            "usd",
        );
        subscription.status = status;
        store.seed_subscription(subscription).await;
        granted
    }

    // ══════════════════════════════════════════════════════════════
    // checkout_completed
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn recurring_checkout_grants_tier_and_opens_subscription() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let outcome = engine.reconcile(&recurring_checkout(user.id)).await.unwrap();

        let change = match outcome {
            ReconcileOutcome::Applied(Some(change)) => change,
            other => panic!("expected applied with change, got {other:?}"),
        };
        assert_eq!(change.kind, EntitlementChangeKind::Granted);
        assert_eq!(change.tier, Tier::Pro);

        let stored = store.user(&user.id).await;
        assert_eq!(stored.tier, Tier::Pro);
        assert_eq!(stored.status, EntitlementStatus::Active);

        let subscription = store.subscription(Gateway::Card, "sub_1").await;
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.tier, Tier::Pro);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn one_time_checkout_grants_tier_without_subscription() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let mut event = recurring_checkout(user.id);
        event.recurring = false;
        event.external_subscription_id = None;

        let outcome = engine.reconcile(&event).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied(Some(_))));
        assert_eq!(store.user(&user.id).await.tier, Tier::Pro);
        assert!(store.subscriptions.read().await.is_empty());
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn unsettled_wallet_checkout_records_payment_without_grant() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let mut event = recurring_checkout(user.id);
        event.gateway = Gateway::Wallet;
        event.recurring = false;
        event.external_subscription_id = None;
        event.payment_status = PaymentStatus::Failed;

        let outcome = engine.reconcile(&event).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied(None)));
        assert_eq!(store.user(&user.id).await.tier, Tier::Free);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn checkout_with_unknown_user_is_unresolved() {
        let (engine, store) = engine_with_store();

        let outcome = engine
            .reconcile(&recurring_checkout(UserId::new()))
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Unresolved(_)));
        assert_eq!(store.payment_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_payment_id_is_reported_as_duplicate() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let event = recurring_checkout(user.id);
        engine.reconcile(&event).await.unwrap();
        let outcome = engine.reconcile(&event).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Duplicate));
        assert_eq!(store.payment_count().await, 1);
    }

    fn pending_wallet_checkout(user_id: UserId) -> GatewayEvent {
        let mut event = GatewayEvent::of_kind(Gateway::Wallet, EventKind::CheckoutCompleted);
        event.external_payment_id = Some("31415926".to_string());
        event.user_reference = Some(user_id);
        event.tier = Some(Tier::Basic);
        event.amount = Some(Decimal::new(1500, 0));
        event.currency = Some("ARS".to_string());
        event.payment_status = PaymentStatus::Pending;
        event
    }

    #[tokio::test]
    async fn pending_wallet_payment_is_recorded_reprocessable() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let outcome = engine
            .reconcile(&pending_wallet_checkout(user.id))
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Pending));
        assert_eq!(store.user(&user.id).await.tier, Tier::Free);
        assert_eq!(
            store.payment(Gateway::Wallet, "31415926").await.status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn approval_settles_pending_payment_and_grants_tier() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let pending = pending_wallet_checkout(user.id);
        engine.reconcile(&pending).await.unwrap();

        let mut approved = pending.clone();
        approved.payment_status = PaymentStatus::Completed;
        let outcome = engine.reconcile(&approved).await.unwrap();

        let change = match outcome {
            ReconcileOutcome::Applied(Some(change)) => change,
            other => panic!("expected applied with change, got {other:?}"),
        };
        assert_eq!(change.kind, EntitlementChangeKind::Granted);
        assert_eq!(change.tier, Tier::Basic);

        assert_eq!(store.payment_count().await, 1);
        assert_eq!(
            store.payment(Gateway::Wallet, "31415926").await.status,
            PaymentStatus::Completed
        );
        let stored = store.user(&user.id).await;
        assert_eq!(stored.tier, Tier::Basic);
        assert_eq!(stored.status, EntitlementStatus::Active);
    }

    #[tokio::test]
    async fn rejection_settles_pending_payment_without_grant() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let pending = pending_wallet_checkout(user.id);
        engine.reconcile(&pending).await.unwrap();

        let mut rejected = pending.clone();
        rejected.payment_status = PaymentStatus::Failed;
        let outcome = engine.reconcile(&rejected).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied(None)));
        assert_eq!(
            store.payment(Gateway::Wallet, "31415926").await.status,
            PaymentStatus::Failed
        );
        assert_eq!(store.user(&user.id).await.tier, Tier::Free);
    }

    #[tokio::test]
    async fn still_pending_notification_stays_reprocessable() {
        let (engine, store) = engine_with_store();
        let user = test_user();
        store.seed_user(user.clone()).await;

        let pending = pending_wallet_checkout(user.id);
        engine.reconcile(&pending).await.unwrap();
        let outcome = engine.reconcile(&pending).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Pending));
        assert_eq!(store.payment_count().await, 1);
    }

    // ══════════════════════════════════════════════════════════════
    // invoice_paid
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn invoice_paid_refreshes_period_and_records_payment() {
        let (engine, store) = engine_with_store();
        seeded_subscription(&store, SubscriptionStatus::Active).await;

        let outcome = engine.reconcile(&invoice_paid()).await.unwrap();

        // Entitlement unchanged, so no notification.
        assert!(matches!(outcome, ReconcileOutcome::Applied(None)));
        let subscription = store.subscription(Gateway::Card, "sub_1").await;
        assert_eq!(
            subscription.current_period_end.map(|t| t.as_unix_secs()),
            Some(1706745600)
        );
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn invoice_paid_restores_past_due_subscription() {
        let (engine, store) = engine_with_store();
        let user = seeded_subscription(&store, SubscriptionStatus::PastDue).await;
        let mut past_due_user = user.clone();
        past_due_user.mark_past_due();
        store.seed_user(past_due_user).await;

        let outcome = engine.reconcile(&invoice_paid()).await.unwrap();

        let change = match outcome {
            ReconcileOutcome::Applied(Some(change)) => change,
            other => panic!("expected applied with change, got {other:?}"),
        };
        assert_eq!(change.kind, EntitlementChangeKind::Renewed);

        let subscription = store.subscription(Gateway::Card, "sub_1").await;
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        let stored = store.user(&user.id).await;
        assert_eq!(stored.status, EntitlementStatus::Active);
        assert_eq!(stored.tier, Tier::Pro);
    }

    #[tokio::test]
    async fn invoice_paid_without_subscription_reference_is_unresolved() {
        let (engine, _store) = engine_with_store();
        let mut event = invoice_paid();
        event.external_subscription_id = None;

        let outcome = engine.reconcile(&event).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Unresolved(_)));
    }

    #[tokio::test]
    async fn late_invoice_paid_after_cancellation_is_a_no_op() {
        let (engine, store) = engine_with_store();
        seeded_subscription(&store, SubscriptionStatus::Canceled).await;

        let outcome = engine.reconcile(&invoice_paid()).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::NoOp(_)));
        assert_eq!(store.payment_count().await, 0);
        assert_eq!(
            store.subscription(Gateway::Card, "sub_1").await.status,
            SubscriptionStatus::Canceled
        );
    }

    // ══════════════════════════════════════════════════════════════
    // invoice_payment_failed
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failed_invoice_moves_to_past_due_keeping_tier() {
        let (engine, store) = engine_with_store();
        let user = seeded_subscription(&store, SubscriptionStatus::Active).await;

        let outcome = engine
            .reconcile(&subscription_event(EventKind::InvoicePaymentFailed))
            .await
            .unwrap();

        let change = match outcome {
            ReconcileOutcome::Applied(Some(change)) => change,
            other => panic!("expected applied with change, got {other:?}"),
        };
        assert_eq!(change.kind, EntitlementChangeKind::PastDue);

        let stored = store.user(&user.id).await;
        assert_eq!(stored.status, EntitlementStatus::PastDue);
        assert_eq!(stored.tier, Tier::Pro);
        assert_eq!(
            store.subscription(Gateway::Card, "sub_1").await.status,
            SubscriptionStatus::PastDue
        );
    }

    // ══════════════════════════════════════════════════════════════
    // subscription_updated / subscription_canceled
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn subscription_updated_copies_status_forward_without_user_change() {
        let (engine, store) = engine_with_store();
        let user = seeded_subscription(&store, SubscriptionStatus::Active).await;

        let mut event = subscription_event(EventKind::SubscriptionUpdated);
        event.subscription_status = Some(SubscriptionStatus::PastDue);
        event.period_end = Some(Timestamp::from_unix_secs(1706745600));
        event.cancel_at_period_end = Some(true);

        let outcome = engine.reconcile(&event).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied(None)));
        let subscription = store.subscription(Gateway::Card, "sub_1").await;
        assert_eq!(subscription.status, SubscriptionStatus::PastDue);
        assert!(subscription.cancel_at_period_end);
        // User untouched by this kind.
        assert_eq!(store.user(&user.id).await.status, EntitlementStatus::Active);
    }

    #[tokio::test]
    async fn cancellation_revokes_entitlement() {
        let (engine, store) = engine_with_store();
        let user = seeded_subscription(&store, SubscriptionStatus::Active).await;

        let outcome = engine
            .reconcile(&subscription_event(EventKind::SubscriptionCanceled))
            .await
            .unwrap();

        let change = match outcome {
            ReconcileOutcome::Applied(Some(change)) => change,
            other => panic!("expected applied with change, got {other:?}"),
        };
        assert_eq!(change.kind, EntitlementChangeKind::Revoked);
        assert_eq!(change.tier, Tier::Free);

        let stored = store.user(&user.id).await;
        assert_eq!(stored.tier, Tier::Free);
        assert_eq!(stored.status, EntitlementStatus::Inactive);
        assert_eq!(
            store.subscription(Gateway::Card, "sub_1").await.status,
            SubscriptionStatus::Canceled
        );
    }

    #[tokio::test]
    async fn repeated_cancellation_is_a_no_op() {
        let (engine, store) = engine_with_store();
        seeded_subscription(&store, SubscriptionStatus::Canceled).await;

        let outcome = engine
            .reconcile(&subscription_event(EventKind::SubscriptionCanceled))
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::NoOp(_)));
    }

    #[tokio::test]
    async fn update_for_canceled_subscription_never_leaves_terminal_state() {
        let (engine, store) = engine_with_store();
        seeded_subscription(&store, SubscriptionStatus::Canceled).await;

        let mut event = subscription_event(EventKind::SubscriptionUpdated);
        event.subscription_status = Some(SubscriptionStatus::Active);

        let outcome = engine.reconcile(&event).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::NoOp(_)));
        assert_eq!(
            store.subscription(Gateway::Card, "sub_1").await.status,
            SubscriptionStatus::Canceled
        );
    }

    #[tokio::test]
    async fn event_for_unknown_subscription_is_unresolved() {
        let (engine, _store) = engine_with_store();

        let outcome = engine
            .reconcile(&subscription_event(EventKind::SubscriptionCanceled))
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Unresolved(_)));
    }

    // ══════════════════════════════════════════════════════════════
    // ignored
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn ignored_kind_produces_zero_mutations() {
        let (engine, store) = engine_with_store();

        let outcome = engine
            .reconcile(&GatewayEvent::of_kind(Gateway::Card, EventKind::Ignored))
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::NoOp(_)));
        assert_eq!(store.payment_count().await, 0);
    }
}

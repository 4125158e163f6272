//! RecordStore port - durable storage for users, subscriptions and
//! payments.
//!
//! The reconciliation engine is the only writer. Reads always hit the
//! store; nothing is cached across requests, because stale entitlement
//! state has financial consequences.

use async_trait::async_trait;

use crate::domain::billing::{Gateway, MutationSet, Payment, Subscription, User};
use crate::domain::foundation::{StoreError, UserId};

/// Port over the billing record store.
///
/// `apply` commits the full mutation set computed for one event as a
/// single atomic unit, so concurrent duplicate deliveries cannot both
/// insert a payment row: the store's unique constraint on
/// `(gateway, gateway_payment_id)` is the final backstop and surfaces
/// as [`StoreError::Duplicate`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    async fn get_subscription(
        &self,
        gateway: Gateway,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn get_payment(
        &self,
        gateway: Gateway,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// Applies every mutation in the set atomically, or none of them.
    async fn apply(&self, mutations: MutationSet) -> Result<(), StoreError>;
}

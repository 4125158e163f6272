//! Subscription entity: one gateway-side recurring billing agreement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

use super::event::Gateway;
use super::status::SubscriptionStatus;
use super::tier::Tier;

/// A recurring billing agreement held at a gateway.
///
/// At most one subscription exists per `(gateway, gateway_subscription_id)`
/// pair; the unique index in the record store enforces this. A user may
/// accumulate historical subscriptions, but only the most recently
/// updated active one is authoritative for the user's entitlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub gateway: Gateway,
    pub gateway_subscription_id: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    /// Whole currency units, never gateway minor units.
    pub amount: Decimal,
    pub currency: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates an active subscription, as the engine does when a
    /// recurring checkout completes. The billing period is unknown at
    /// checkout time and is filled in by the first invoice event.
    pub fn new_active(
        user_id: UserId,
        gateway: Gateway,
        gateway_subscription_id: impl Into<String>,
        tier: Tier,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::new(),
            user_id,
            gateway,
            gateway_subscription_id: gateway_subscription_id.into(),
            tier,
            status: SubscriptionStatus::Active,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            amount,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the billing period forward after a paid invoice.
    pub fn refresh_period(&mut self, start: Option<Timestamp>, end: Option<Timestamp>) {
        if start.is_some() {
            self.current_period_start = start;
        }
        if end.is_some() {
            self.current_period_end = end;
        }
        self.updated_at = Timestamp::now();
    }

    pub fn mark_past_due(&mut self) {
        self.status = SubscriptionStatus::PastDue;
        self.updated_at = Timestamp::now();
    }

    pub fn restore_active(&mut self) {
        self.status = SubscriptionStatus::Active;
        self.updated_at = Timestamp::now();
    }

    /// Terminal transition. Callers must check `is_canceled` first;
    /// the engine never calls any mutator on a canceled subscription.
    pub fn cancel(&mut self) {
        self.status = SubscriptionStatus::Canceled;
        self.updated_at = Timestamp::now();
    }
}

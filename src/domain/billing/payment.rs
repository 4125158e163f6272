//! Payment entity: one discrete monetary transaction.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, SubscriptionId, Timestamp, UserId};

use super::event::Gateway;
use super::status::{BillingPeriod, PaymentStatus};
use super::tier::Tier;

/// One charge as reported by a gateway.
///
/// `gateway_payment_id` is the natural idempotency key: globally unique
/// per gateway, enforced by a unique index. A payment is created exactly
/// once per distinct gateway payment id; amount and currency are
/// immutable afterwards, and a `Completed` status never regresses.
///
/// A payment weakly references its subscription: one-time purchases
/// have none, and a payment outlives a canceled subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub subscription_id: Option<SubscriptionId>,
    pub gateway: Gateway,
    pub gateway_payment_id: String,
    pub gateway_customer_id: Option<String>,
    /// Whole currency units, never gateway minor units.
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub product_tier: Tier,
    pub billing_period: BillingPeriod,
    /// Original gateway payload, retained for audit and replay.
    pub raw_payload: serde_json::Value,
    pub created_at: Timestamp,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        subscription_id: Option<SubscriptionId>,
        gateway: Gateway,
        gateway_payment_id: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        status: PaymentStatus,
        product_tier: Tier,
        billing_period: BillingPeriod,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            user_id,
            subscription_id,
            gateway,
            gateway_payment_id: gateway_payment_id.into(),
            gateway_customer_id: None,
            amount,
            currency: currency.into(),
            status,
            product_tier,
            billing_period,
            raw_payload,
            created_at: Timestamp::now(),
        }
    }

    pub fn with_customer_id(mut self, customer_id: Option<String>) -> Self {
        self.gateway_customer_id = customer_id;
        self
    }

    /// Resolves a pending payment to the status the gateway settled on.
    pub fn settle(&mut self, status: PaymentStatus) {
        self.status = status;
    }
}

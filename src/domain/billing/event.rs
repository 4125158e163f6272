//! Canonical gateway event: the uniform internal form of one webhook
//! delivery, produced by the normalizer and consumed by the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Timestamp, UserId};

use super::status::{PaymentStatus, SubscriptionStatus};
use super::tier::Tier;

/// The payment gateway that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    /// Card-processing gateway. Signed webhooks, minor-unit amounts.
    Card,
    /// Regional wallet/checkout gateway. Unsigned poke notifications,
    /// authoritative data re-fetched from the gateway's query API.
    Wallet,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Card => "card",
            Gateway::Wallet => "wallet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(Gateway::Card),
            "wallet" => Some(Gateway::Wallet),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical event kind.
///
/// A closed enumeration so the engine's match is exhaustive; adding a
/// kind is a compile-time-checked change. Unrecognized gateway event
/// types normalize to `Ignored` instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CheckoutCompleted,
    InvoicePaid,
    InvoicePaymentFailed,
    SubscriptionUpdated,
    SubscriptionCanceled,
    /// Unknown or irrelevant gateway event type; acknowledged, no-op.
    Ignored,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CheckoutCompleted => "checkout_completed",
            EventKind::InvoicePaid => "invoice_paid",
            EventKind::InvoicePaymentFailed => "invoice_payment_failed",
            EventKind::SubscriptionUpdated => "subscription_updated",
            EventKind::SubscriptionCanceled => "subscription_canceled",
            EventKind::Ignored => "ignored",
        }
    }
}

/// Canonical normalized form of one webhook delivery.
///
/// Transient: never persisted as its own table, though `raw_payload`
/// is retained on created payments and in the webhook-event journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub gateway: Gateway,
    pub kind: EventKind,
    /// Gateway-assigned event id (card gateway: `evt_...`). The wallet
    /// gateway has none; its payment id stands in.
    pub external_event_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    /// Opaque reference embedded at checkout time that resolves to an
    /// internal user.
    pub user_reference: Option<UserId>,
    pub tier: Option<Tier>,
    /// Whole currency units. The normalizer has already divided
    /// minor-unit gateways by their scale.
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    /// Status carried on `subscription_updated` events. Absent when
    /// the gateway reports a status outside the mapped vocabulary, in
    /// which case the stored status holds.
    pub subscription_status: Option<SubscriptionStatus>,
    pub cancel_at_period_end: Option<bool>,
    /// True when a completed checkout opened a recurring agreement.
    pub recurring: bool,
    /// Status of the underlying charge. `Completed` for card events
    /// (the gateway only reports settled charges on these kinds);
    /// mapped from the gateway record for wallet payments.
    pub payment_status: PaymentStatus,
    pub raw_payload: serde_json::Value,
}

impl GatewayEvent {
    /// Empty event of a kind, filled in by the normalizer.
    pub fn of_kind(gateway: Gateway, kind: EventKind) -> Self {
        Self {
            gateway,
            kind,
            external_event_id: None,
            external_payment_id: None,
            external_subscription_id: None,
            external_customer_id: None,
            user_reference: None,
            tier: None,
            amount: None,
            currency: None,
            period_start: None,
            period_end: None,
            subscription_status: None,
            cancel_at_period_end: None,
            recurring: false,
            payment_status: PaymentStatus::Completed,
            raw_payload: serde_json::Value::Null,
        }
    }

    /// The deduplication key for this delivery.
    ///
    /// Payment id first when the kind carries one; the gateway event id
    /// as fallback for subscription lifecycle kinds, which have no
    /// payment. `None` only for degenerate payloads that identify
    /// nothing, which skip the guard entirely.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.external_payment_id
            .as_deref()
            .or(self.external_event_id.as_deref())
    }
}

//! Payload normalization: gateway-specific wire formats in, canonical
//! [`GatewayEvent`] out.
//!
//! Only the fields our processing needs are captured; the rest of the
//! gateway schema rides along in `raw_payload`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::domain::foundation::{Timestamp, UserId};

use super::errors::NormalizeError;
use super::event::{EventKind, Gateway, GatewayEvent};
use super::status::{PaymentStatus, SubscriptionStatus};
use super::tier::Tier;

// ══════════════════════════════════════════════════════════════════
// Card gateway wire format
// ══════════════════════════════════════════════════════════════════

/// Envelope the card gateway wraps every event in.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardEvent {
    /// Gateway event id (`evt_...`).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp the event was created at.
    pub created: i64,

    pub data: CardEventData,

    pub livemode: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardEventData {
    /// Polymorphic per event type; picked apart per kind below.
    pub object: serde_json::Value,
}

/// Card event types we act on. Everything else normalizes to
/// [`EventKind::Ignored`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CardEventType {
    CheckoutSessionCompleted,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    SubscriptionUpdated,
    SubscriptionDeleted,
    Unknown,
}

impl CardEventType {
    fn from_wire(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "invoice.payment_succeeded" | "invoice.paid" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            _ => Self::Unknown,
        }
    }
}

// ══════════════════════════════════════════════════════════════════
// Wallet gateway record
// ══════════════════════════════════════════════════════════════════

/// A payment record fetched back from the wallet gateway's query API.
///
/// The webhook notification itself carries only the payment id; the
/// gateway client resolves it into this before normalization.
#[derive(Debug, Clone)]
pub struct WalletPayment {
    pub id: String,
    /// Gateway status string ("approved", "rejected", ...).
    pub status: String,
    /// Opaque reference set at checkout: `<user-uuid>|<tier>`.
    pub external_reference: Option<String>,
    /// Whole currency units, the gateway's native scale.
    pub amount: Decimal,
    pub currency: Option<String>,
    pub raw: serde_json::Value,
}

// ══════════════════════════════════════════════════════════════════
// Card normalization
// ══════════════════════════════════════════════════════════════════

/// Normalizes a verified card-gateway payload.
pub fn normalize_card(payload: &[u8]) -> Result<GatewayEvent, NormalizeError> {
    let wire: CardEvent = serde_json::from_slice(payload)?;
    let object = &wire.data.object;

    let mut event = match CardEventType::from_wire(&wire.event_type) {
        CardEventType::CheckoutSessionCompleted => normalize_checkout(object)?,
        CardEventType::InvoicePaymentSucceeded => normalize_invoice_paid(object)?,
        CardEventType::InvoicePaymentFailed => normalize_invoice_failed(object),
        CardEventType::SubscriptionUpdated => normalize_subscription_updated(object)?,
        CardEventType::SubscriptionDeleted => normalize_subscription_deleted(object)?,
        CardEventType::Unknown => GatewayEvent::of_kind(Gateway::Card, EventKind::Ignored),
    };

    event.external_event_id = Some(wire.id.clone());
    event.raw_payload = serde_json::to_value(&wire)?;
    Ok(event)
}

fn normalize_checkout(object: &serde_json::Value) -> Result<GatewayEvent, NormalizeError> {
    const KIND: &str = "checkout_completed";

    let session_id = require_str(object, "id", KIND)?;
    let metadata = object.get("metadata").and_then(|m| m.as_object());

    let user_id = metadata
        .and_then(|m| m.get("user_id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed(KIND, "metadata.user_id missing"))?;
    let user_id = Uuid::parse_str(user_id)
        .map(UserId::from_uuid)
        .map_err(|_| malformed(KIND, "metadata.user_id is not a UUID"))?;

    // Tier defaults when the checkout link predates tier metadata.
    let tier = match metadata.and_then(|m| m.get("tier")).and_then(|v| v.as_str()) {
        None => Tier::Basic,
        Some(raw) => Tier::parse(raw)
            .ok_or_else(|| malformed(KIND, format!("unknown tier {raw:?}")))?,
    };

    let subscription_id = opt_str(object, "subscription");
    let recurring = subscription_id.is_some()
        || object.get("mode").and_then(|v| v.as_str()) == Some("subscription");

    let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::CheckoutCompleted);
    // One-time payments settle through a payment intent; subscription
    // checkouts may not expose one yet, so the session id stands in.
    event.external_payment_id =
        Some(opt_str(object, "payment_intent").unwrap_or_else(|| session_id.to_string()));
    event.external_subscription_id = subscription_id;
    event.external_customer_id = opt_str(object, "customer");
    event.user_reference = Some(user_id);
    event.tier = Some(tier);
    event.amount = object
        .get("amount_total")
        .and_then(|v| v.as_i64())
        .map(minor_units_to_decimal);
    event.currency = opt_str(object, "currency");
    event.recurring = recurring;
    Ok(event)
}

fn normalize_invoice_paid(object: &serde_json::Value) -> Result<GatewayEvent, NormalizeError> {
    const KIND: &str = "invoice_paid";

    let payment_intent = require_str(object, "payment_intent", KIND)?;
    let amount_paid = object
        .get("amount_paid")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| malformed(KIND, "amount_paid missing"))?;

    let period_start = object.get("period_start").and_then(|v| v.as_i64());
    let period_end = object.get("period_end").and_then(|v| v.as_i64());

    let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::InvoicePaid);
    event.external_payment_id = Some(payment_intent.to_string());
    // Absent on one-off invoices; the engine reports those unresolved.
    event.external_subscription_id = opt_str(object, "subscription");
    event.external_customer_id = opt_str(object, "customer");
    event.amount = Some(minor_units_to_decimal(amount_paid));
    event.currency = opt_str(object, "currency");
    event.period_start = period_start.map(Timestamp::from_unix_secs);
    event.period_end = period_end.map(Timestamp::from_unix_secs);
    event.recurring = true;
    Ok(event)
}

fn normalize_invoice_failed(object: &serde_json::Value) -> GatewayEvent {
    let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::InvoicePaymentFailed);
    event.external_subscription_id = opt_str(object, "subscription");
    event.external_customer_id = opt_str(object, "customer");
    event.payment_status = PaymentStatus::Failed;
    event.recurring = true;
    event
}

fn normalize_subscription_updated(
    object: &serde_json::Value,
) -> Result<GatewayEvent, NormalizeError> {
    const KIND: &str = "subscription_updated";

    let subscription_id = require_str(object, "id", KIND)?;
    let status_raw = require_str(object, "status", KIND)?;

    let status = map_card_subscription_status(status_raw);
    if status.is_none() {
        warn!(status = status_raw, "unmapped subscription status, leaving stored status in place");
    }

    let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::SubscriptionUpdated);
    event.external_subscription_id = Some(subscription_id.to_string());
    event.subscription_status = status;
    event.period_start = object
        .get("current_period_start")
        .and_then(|v| v.as_i64())
        .map(Timestamp::from_unix_secs);
    event.period_end = object
        .get("current_period_end")
        .and_then(|v| v.as_i64())
        .map(Timestamp::from_unix_secs);
    event.cancel_at_period_end = object.get("cancel_at_period_end").and_then(|v| v.as_bool());
    event.recurring = true;
    Ok(event)
}

fn normalize_subscription_deleted(
    object: &serde_json::Value,
) -> Result<GatewayEvent, NormalizeError> {
    const KIND: &str = "subscription_canceled";

    let subscription_id = require_str(object, "id", KIND)?;

    let mut event = GatewayEvent::of_kind(Gateway::Card, EventKind::SubscriptionCanceled);
    event.external_subscription_id = Some(subscription_id.to_string());
    event.recurring = true;
    Ok(event)
}

/// The card gateway's subscription statuses collapse onto our three.
/// Only genuinely terminal gateway statuses map to `Canceled`; anything
/// outside the vocabulary maps to `None` and the stored status holds.
fn map_card_subscription_status(raw: &str) -> Option<SubscriptionStatus> {
    match raw {
        "active" | "trialing" => Some(SubscriptionStatus::Active),
        "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
        "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
        _ => None,
    }
}

// ══════════════════════════════════════════════════════════════════
// Wallet normalization
// ══════════════════════════════════════════════════════════════════

/// Normalizes a wallet payment record fetched from the gateway.
///
/// Wallet payments are one-time purchases; there is no subscription
/// object on this gateway.
pub fn normalize_wallet(payment: &WalletPayment) -> Result<GatewayEvent, NormalizeError> {
    const KIND: &str = "wallet_payment";

    let reference = payment
        .external_reference
        .as_deref()
        .ok_or_else(|| malformed(KIND, "external_reference missing"))?;
    let (user_id, tier) = parse_external_reference(reference)
        .ok_or_else(|| malformed(KIND, format!("unparseable external_reference {reference:?}")))?;

    let mut event = GatewayEvent::of_kind(Gateway::Wallet, EventKind::CheckoutCompleted);
    event.external_payment_id = Some(payment.id.clone());
    event.user_reference = Some(user_id);
    event.tier = Some(tier);
    event.amount = Some(payment.amount);
    event.currency = payment.currency.clone();
    event.payment_status = map_wallet_status(&payment.status);
    event.raw_payload = payment.raw.clone();
    Ok(event)
}

/// Splits the checkout reference `<user-uuid>|<tier>`.
fn parse_external_reference(reference: &str) -> Option<(UserId, Tier)> {
    let (user_part, tier_part) = reference.split_once('|')?;
    let user_id = Uuid::parse_str(user_part).ok().map(UserId::from_uuid)?;
    let tier = Tier::parse(tier_part)?;
    Some((user_id, tier))
}

fn map_wallet_status(raw: &str) -> PaymentStatus {
    match raw {
        "approved" => PaymentStatus::Completed,
        "refunded" | "charged_back" => PaymentStatus::Refunded,
        "rejected" | "cancelled" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

// ══════════════════════════════════════════════════════════════════
// Field extraction helpers
// ══════════════════════════════════════════════════════════════════

fn opt_str(object: &serde_json::Value, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn require_str<'a>(
    object: &'a serde_json::Value,
    field: &str,
    kind: &'static str,
) -> Result<&'a str, NormalizeError> {
    object
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed(kind, format!("{field} missing")))
}

fn malformed(kind: &'static str, reason: impl Into<String>) -> NormalizeError {
    NormalizeError::MalformedPayload {
        kind,
        reason: reason.into(),
    }
}

/// Minor units (cents) to whole currency units.
fn minor_units_to_decimal(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

//! Status enumerations for the subscription and payment lifecycle.

use serde::{Deserialize, Serialize};

/// Subscription lifecycle status.
///
/// `Canceled` is terminal: once a subscription is canceled no event may
/// move it to any other status. Late gateway deliveries against a
/// canceled subscription are logged no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Billing in good standing.
    Active,
    /// Last billing-cycle charge failed; grace period, tier retained.
    PastDue,
    /// Terminal. The gateway-side agreement no longer exists.
    Canceled,
}

impl SubscriptionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }
}

/// User-level entitlement status, derived from the authoritative
/// subscription by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    /// Initial state; also the state after cancellation.
    Inactive,
    /// Paid access granted.
    Active,
    /// Payment failed, grace period. Tier retained.
    PastDue,
}

impl EntitlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementStatus::Inactive => "inactive",
            EntitlementStatus::Active => "active",
            EntitlementStatus::PastDue => "past_due",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inactive" => Some(EntitlementStatus::Inactive),
            "active" => Some(EntitlementStatus::Active),
            "past_due" => Some(EntitlementStatus::PastDue),
            _ => None,
        }
    }
}

/// Status of one discrete monetary transaction.
///
/// `Completed` never regresses; a refund moves to `Refunded`, not back
/// to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// Billing cadence of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    OneTime,
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::OneTime => "one_time",
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "one_time" => Some(BillingPeriod::OneTime),
            "monthly" => Some(BillingPeriod::Monthly),
            "yearly" => Some(BillingPeriod::Yearly),
            _ => None,
        }
    }
}

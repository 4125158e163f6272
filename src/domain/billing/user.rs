//! User entity bridging the chat identity and the billing identity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ChatId, Timestamp, UserId};

use super::status::EntitlementStatus;
use super::tier::Tier;

/// A user known to the system.
///
/// Created on first contact with the bot (out of scope here); the
/// reconciliation engine is the only writer of `tier` and `status`.
/// Users are never deleted, only deactivated.
///
/// Invariant: `tier`/`status` always reflect the most recently applied
/// authoritative subscription or one-time purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Stable chat-platform id, unique per user.
    pub chat_id: ChatId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language_code: Option<String>,
    pub tier: Tier,
    pub status: EntitlementStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// Creates a user with no entitlement, as the bot does on first contact.
    pub fn new(id: UserId, chat_id: ChatId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            chat_id,
            username: None,
            first_name: None,
            language_code: None,
            tier: Tier::Free,
            status: EntitlementStatus::Inactive,
            created_at: now,
            updated_at: now,
        }
    }

    /// Grants a paid tier after a completed payment.
    pub fn grant(&mut self, tier: Tier) {
        self.tier = tier;
        self.status = EntitlementStatus::Active;
        self.updated_at = Timestamp::now();
    }

    /// Marks the entitlement past due. The tier is retained (grace period).
    pub fn mark_past_due(&mut self) {
        self.status = EntitlementStatus::PastDue;
        self.updated_at = Timestamp::now();
    }

    /// Restores an active entitlement after a successful retry payment.
    pub fn restore(&mut self) {
        self.status = EntitlementStatus::Active;
        self.updated_at = Timestamp::now();
    }

    /// Revokes the entitlement when the backing subscription is canceled.
    pub fn revoke(&mut self) {
        self.tier = Tier::Free;
        self.status = EntitlementStatus::Inactive;
        self.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(UserId::new(), ChatId::new(42))
    }

    #[test]
    fn new_user_starts_free_and_inactive() {
        let u = user();
        assert_eq!(u.tier, Tier::Free);
        assert_eq!(u.status, EntitlementStatus::Inactive);
    }

    #[test]
    fn grant_sets_tier_and_activates() {
        let mut u = user();
        u.grant(Tier::Pro);
        assert_eq!(u.tier, Tier::Pro);
        assert_eq!(u.status, EntitlementStatus::Active);
    }

    #[test]
    fn past_due_keeps_tier() {
        let mut u = user();
        u.grant(Tier::Basic);
        u.mark_past_due();
        assert_eq!(u.tier, Tier::Basic);
        assert_eq!(u.status, EntitlementStatus::PastDue);
    }

    #[test]
    fn restore_reactivates_without_touching_tier() {
        let mut u = user();
        u.grant(Tier::Enterprise);
        u.mark_past_due();
        u.restore();
        assert_eq!(u.tier, Tier::Enterprise);
        assert_eq!(u.status, EntitlementStatus::Active);
    }

    #[test]
    fn revoke_resets_to_free_inactive() {
        let mut u = user();
        u.grant(Tier::Pro);
        u.revoke();
        assert_eq!(u.tier, Tier::Free);
        assert_eq!(u.status, EntitlementStatus::Inactive);
    }
}

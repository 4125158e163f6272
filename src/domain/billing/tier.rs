//! Product tier definitions.
//!
//! Represents the paid tiers granted through gateway payments.

use serde::{Deserialize, Serialize};

/// Product subscription tier.
///
/// Determines feature access for a user. Granted by the reconciliation
/// engine when a payment completes and revoked when the backing
/// subscription is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Default tier for users without a completed payment.
    Free,
    /// Entry paid tier.
    Basic,
    /// Mid paid tier.
    Pro,
    /// Top paid tier.
    Enterprise,
}

impl Tier {
    /// Returns true if this tier is a paid tier.
    pub fn is_paid(&self) -> bool {
        !matches!(self, Tier::Free)
    }

    /// Stable string code used in storage and gateway metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Parses the string code used in gateway metadata.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Tier::Free),
            "basic" => Some(Tier::Basic),
            "pro" => Some(Tier::Pro),
            "enterprise" => Some(Tier::Enterprise),
            _ => None,
        }
    }

    /// Numeric rank of this tier for comparison. Higher means more features.
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Free => 0,
            Tier::Basic => 1,
            Tier::Pro => 2,
            Tier::Enterprise => 3,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

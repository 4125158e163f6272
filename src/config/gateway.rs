//! Payment gateway configuration
//!
//! Each gateway is optional so a deployment can run with either one,
//! but at least one must be configured. A missing card secret means
//! the card endpoint rejects everything (verification fails closed).

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaysConfig {
    #[serde(default)]
    pub card: CardGatewayConfig,

    #[serde(default)]
    pub wallet: WalletGatewayConfig,
}

/// Card gateway (signed webhooks).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardGatewayConfig {
    /// Webhook signing secret from the gateway dashboard.
    pub webhook_secret: Option<SecretString>,
}

impl CardGatewayConfig {
    pub fn is_configured(&self) -> bool {
        self.webhook_secret.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(secret) = &self.webhook_secret {
            if !secret.expose_secret().starts_with("whsec_") {
                return Err(ValidationError::InvalidCardWebhookSecret);
            }
        }
        Ok(())
    }
}

/// Wallet gateway (poke-to-refetch notifications).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletGatewayConfig {
    /// API access token for the payment-query endpoint.
    pub access_token: Option<SecretString>,

    /// Override for tests; None means the production host.
    pub api_base_url: Option<String>,

    #[serde(default = "default_wallet_timeout_secs")]
    pub timeout_secs: u64,
}

impl WalletGatewayConfig {
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 || self.timeout_secs > 60 {
            return Err(ValidationError::InvalidWalletTimeout);
        }
        Ok(())
    }
}

fn default_wallet_timeout_secs() -> u64 {
    10
}

impl GatewaysConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.card.is_configured() && !self.wallet.is_configured() {
            return Err(ValidationError::NoGatewayConfigured);
        }
        self.card.validate()?;
        self.wallet.validate()
    }
}

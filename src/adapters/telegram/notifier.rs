//! Telegram Bot API implementation of the UserNotifier port.
//!
//! Sends one `sendMessage` call per entitlement change. Strictly
//! best-effort: the caller logs failures and moves on, so this adapter
//! never retries.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::domain::billing::{EntitlementChange, EntitlementChangeKind};
use crate::ports::{NotifyError, UserNotifier};

const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TelegramConfig {
    bot_token: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn message_for(change: &EntitlementChange) -> String {
        match change.kind {
            EntitlementChangeKind::Granted => format!(
                "Payment received! Your {} plan is now active. Thank you!",
                change.tier
            ),
            EntitlementChangeKind::Renewed => format!(
                "Your {} subscription has been renewed. Everything is back in order.",
                change.tier
            ),
            EntitlementChangeKind::PastDue => format!(
                "We couldn't process your latest payment. Your {} plan stays active for now; please update your payment method.",
                change.tier
            ),
            EntitlementChangeKind::Revoked => {
                "Your subscription has been canceled. You can re-subscribe any time.".to_string()
            }
        }
    }
}

#[async_trait]
impl UserNotifier for TelegramNotifier {
    async fn notify(&self, change: &EntitlementChange) -> Result<(), NotifyError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url,
            self.config.bot_token.expose_secret()
        );
        let text = Self::message_for(change);

        let response = self
            .http_client
            .post(&url)
            .json(&SendMessageRequest {
                chat_id: change.chat_id.value(),
                text: &text,
            })
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "telegram answered {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{EntitlementStatus, Tier};
    use crate::domain::foundation::{ChatId, UserId};

    fn change(kind: EntitlementChangeKind, tier: Tier) -> EntitlementChange {
        EntitlementChange {
            user_id: UserId::new(),
            chat_id: ChatId::new(7),
            tier,
            status: EntitlementStatus::Active,
            kind,
        }
    }

    #[test]
    fn granted_message_names_the_tier() {
        let text = TelegramNotifier::message_for(&change(EntitlementChangeKind::Granted, Tier::Pro));
        assert!(text.contains("pro"));
        assert!(text.contains("active"));
    }

    #[test]
    fn past_due_message_asks_for_payment_update() {
        let text =
            TelegramNotifier::message_for(&change(EntitlementChangeKind::PastDue, Tier::Basic));
        assert!(text.contains("payment method"));
    }

    #[test]
    fn revoked_message_mentions_cancellation() {
        let text =
            TelegramNotifier::message_for(&change(EntitlementChangeKind::Revoked, Tier::Free));
        assert!(text.contains("canceled"));
    }
}

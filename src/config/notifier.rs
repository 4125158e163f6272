//! Notifier configuration

use secrecy::SecretString;
use serde::Deserialize;

/// Chat notifier settings. Optional: without a bot token the process
/// runs with notifications disabled (logged, not sent).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierConfig {
    pub bot_token: Option<SecretString>,
}

impl NotifierConfig {
    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

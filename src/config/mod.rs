//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using
//! the `config` and `dotenvy` crates. Variables carry the
//! `ENTITLEMENT_BRIDGE` prefix with `__` separating nested values:
//!
//! - `ENTITLEMENT_BRIDGE__SERVER__PORT=8080` -> `server.port`
//! - `ENTITLEMENT_BRIDGE__DATABASE__URL=...` -> `database.url`
//! - `ENTITLEMENT_BRIDGE__GATEWAYS__CARD__WEBHOOK_SECRET=whsec_...`

mod database;
mod error;
mod gateway;
mod notifier;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::{CardGatewayConfig, GatewaysConfig, WalletGatewayConfig};
pub use notifier::NotifierConfig;
pub use server::ServerConfig;

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub gateways: GatewaysConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl AppConfig {
    /// Loads configuration from the environment, reading `.env` first
    /// when present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ENTITLEMENT_BRIDGE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateways.validate()
    }
}

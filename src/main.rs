use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use entitlement_bridge::adapters::http::{router, AppState};
use entitlement_bridge::adapters::mercadopago::{MercadoPagoClient, MercadoPagoConfig};
use entitlement_bridge::adapters::postgres::{PostgresRecordStore, PostgresWebhookEventRepository};
use entitlement_bridge::adapters::telegram::{TelegramConfig, TelegramNotifier};
use entitlement_bridge::application::ProcessWebhookHandler;
use entitlement_bridge::config::AppConfig;
use entitlement_bridge::domain::billing::{
    CardSignatureVerifier, EntitlementChange, ReconciliationEngine, WalletPayment,
};
use entitlement_bridge::ports::{
    NotifyError, UserNotifier, WalletFetchError, WalletGatewayClient,
};

/// Stands in when no wallet gateway is configured: every notification
/// fails retryable so nothing is silently dropped.
struct UnconfiguredWalletClient;

#[async_trait]
impl WalletGatewayClient for UnconfiguredWalletClient {
    async fn fetch_payment(&self, _payment_id: &str) -> Result<WalletPayment, WalletFetchError> {
        Err(WalletFetchError::Unreachable(
            "wallet gateway is not configured".to_string(),
        ))
    }
}

/// Stands in when no bot token is configured.
struct LoggingNotifier;

#[async_trait]
impl UserNotifier for LoggingNotifier {
    async fn notify(&self, change: &EntitlementChange) -> Result<(), NotifyError> {
        info!(
            user_id = %change.user_id,
            tier = %change.tier,
            kind = ?change.kind,
            "entitlement change (notifier disabled)"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let record_store = Arc::new(PostgresRecordStore::new(pool.clone()));
    let webhook_events = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));

    let card_verifier =
        CardSignatureVerifier::new(config.gateways.card.webhook_secret.clone());
    if !config.gateways.card.is_configured() {
        warn!("card gateway secret missing, card webhooks will be rejected");
    }

    let wallet_client: Arc<dyn WalletGatewayClient> =
        match config.gateways.wallet.access_token.clone() {
            Some(token) => {
                let mut mp_config = MercadoPagoConfig::new(token)
                    .with_timeout(Duration::from_secs(config.gateways.wallet.timeout_secs));
                if let Some(base_url) = config.gateways.wallet.api_base_url.clone() {
                    mp_config = mp_config.with_base_url(base_url);
                }
                Arc::new(MercadoPagoClient::new(mp_config)?)
            }
            None => {
                warn!("wallet gateway token missing, wallet webhooks will fail retryable");
                Arc::new(UnconfiguredWalletClient)
            }
        };

    let notifier: Arc<dyn UserNotifier> = match config.notifier.bot_token.clone() {
        Some(token) => Arc::new(TelegramNotifier::new(TelegramConfig::new(token))?),
        None => Arc::new(LoggingNotifier),
    };

    let webhooks = Arc::new(ProcessWebhookHandler::new(
        card_verifier,
        wallet_client,
        ReconciliationEngine::new(record_store),
        webhook_events,
        notifier,
    ));

    let app = router(AppState { webhooks });
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

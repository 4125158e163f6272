//! WalletGatewayClient port - outbound query API of the wallet gateway.
//!
//! Wallet notifications are never trusted as data; they only name a
//! payment id, and the authoritative record is fetched back from the
//! gateway before anything is acted on.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::billing::WalletPayment;

#[derive(Debug, Error)]
pub enum WalletFetchError {
    /// The gateway has no payment under this id. Not retryable.
    #[error("wallet gateway has no payment {0}")]
    NotFound(String),

    /// Transport failure, timeout, or gateway-side 5xx. The caller
    /// answers with a retryable status so the gateway redelivers.
    #[error("wallet gateway unreachable: {0}")]
    Unreachable(String),
}

/// Port over the wallet gateway's payment-query API. The fetch must be
/// bounded by a timeout; there is no internal retry loop.
#[async_trait]
pub trait WalletGatewayClient: Send + Sync {
    async fn fetch_payment(&self, payment_id: &str) -> Result<WalletPayment, WalletFetchError>;
}

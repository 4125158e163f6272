//! MercadoPago payment-query client.
//!
//! Implements the WalletGatewayClient port: given the payment id from
//! a webhook poke, fetches the authoritative payment record from
//! `GET /v1/payments/{id}`. The call is bounded by a timeout; a 404
//! maps to `NotFound`, everything else transient to `Unreachable`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::billing::WalletPayment;
use crate::ports::{WalletFetchError, WalletGatewayClient};

const DEFAULT_API_BASE_URL: &str = "https://api.mercadopago.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the MercadoPago client.
pub struct MercadoPagoConfig {
    access_token: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl MercadoPagoConfig {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            access_token,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Points the client at a different host. Used by tests.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct MercadoPagoClient {
    config: MercadoPagoConfig,
    http_client: reqwest::Client,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl WalletGatewayClient for MercadoPagoClient {
    async fn fetch_payment(&self, payment_id: &str) -> Result<WalletPayment, WalletFetchError> {
        let url = format!("{}/v1/payments/{}", self.config.api_base_url, payment_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| WalletFetchError::Unreachable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(WalletFetchError::NotFound(payment_id.to_string()))
            }
            status if !status.is_success() => {
                return Err(WalletFetchError::Unreachable(format!(
                    "gateway answered {status}"
                )))
            }
            _ => {}
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WalletFetchError::Unreachable(e.to_string()))?;

        Ok(parse_payment(payment_id, body))
    }
}

/// Pulls the fields we act on out of the gateway's payment document.
/// Everything else stays in `raw` for the audit trail.
fn parse_payment(payment_id: &str, body: serde_json::Value) -> WalletPayment {
    let id = body
        .get("id")
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| payment_id.to_string());

    let status = body
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let external_reference = body
        .get("external_reference")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    // The gateway reports whole currency units as a JSON number;
    // going through the string form avoids float artifacts.
    let amount = body
        .get("transaction_amount")
        .map(|v| v.to_string())
        .and_then(|s| Decimal::from_str(&s).ok())
        .unwrap_or(Decimal::ZERO);

    let currency = body
        .get("currency_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    WalletPayment {
        id,
        status,
        external_reference,
        amount,
        currency,
        raw: body,
    }
}

//! HTTP handlers for the webhook endpoints.
//!
//! The body is taken as raw bytes and kept unparsed until the verifier
//! has run; signature verification covers the exact bytes on the wire.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::application::{ProcessWebhookHandler, WebhookOutcome};
use crate::domain::billing::WebhookError;

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub webhooks: Arc<ProcessWebhookHandler>,
}

/// `POST /webhooks/card`
pub async fn handle_card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.process_card(&body, signature).await?;
    Ok(acknowledge(outcome))
}

/// `POST /webhooks/wallet`
pub async fn handle_wallet_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.webhooks.process_wallet(&body).await?;
    Ok(acknowledge(outcome))
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Every reconciliation outcome answers 200: applied, duplicate,
/// ignored and unresolved must all stop gateway redelivery.
fn acknowledge(outcome: WebhookOutcome) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": outcome.as_str() })),
    )
        .into_response()
}

/// API error wrapper mapping pipeline errors to HTTP responses.
///
/// 4xx means "malformed, do not redeliver"; 5xx/502 means "transient,
/// please redeliver" and is reserved for gateway-unreachable and
/// record-store outages.
pub struct ApiError(WebhookError);

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "status": "error",
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::AuthError;

    #[test]
    fn auth_error_renders_401() {
        let response = ApiError(WebhookError::Auth(AuthError::InvalidSignature)).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unreachable_gateway_renders_502() {
        let response =
            ApiError(WebhookError::Auth(AuthError::GatewayUnreachable("timeout".into())))
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}

//! Axum router for the webhook surface.
//!
//! # Routes
//!
//! - `POST /webhooks/card` - card gateway (signature verified)
//! - `POST /webhooks/wallet` - wallet gateway (re-fetch verified)
//! - `GET /healthz` - liveness probe

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{handle_card_webhook, handle_wallet_webhook, healthz, AppState};

/// Wallet re-fetch plus store writes fit comfortably in this bound;
/// anything slower should fail retryable rather than hold the gateway.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/card", post(handle_card_webhook))
        .route("/webhooks/wallet", post(handle_wallet_webhook))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

//! Webhook-pipeline error taxonomy.
//!
//! Three families matching the pipeline stages: authentication,
//! normalization, persistence. The HTTP layer maps them to status
//! codes through [`WebhookError::status_code`]; retryability decides
//! whether the gateway should redeliver.

use thiserror::Error;

use crate::domain::foundation::StoreError;

use super::event::Gateway;

/// Failures establishing that a delivery genuinely came from the
/// gateway, plus failures reaching the gateway to resolve a
/// notification.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No webhook secret configured for this gateway. Verification
    /// fails closed rather than waving payloads through.
    #[error("no webhook secret configured for {0} gateway")]
    MissingSecret(Gateway),

    #[error("missing signature header")]
    MissingSignature,

    #[error("signature does not match payload")]
    InvalidSignature,

    /// Signed timestamp too old; treated as a possible replay.
    #[error("payload timestamp is {age_secs}s old, exceeds tolerance")]
    StalePayload { age_secs: i64 },

    /// Signed timestamp ahead of our clock beyond the allowed skew.
    #[error("payload timestamp is in the future")]
    FutureTimestamp,

    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    /// Gateway lookup for a notification found no such record.
    #[error("gateway has no record matching {0}")]
    NotFound(String),

    /// Gateway lookup failed for transport or server-side reasons.
    #[error("gateway unreachable: {0}")]
    GatewayUnreachable(String),
}

/// Failures turning a verified payload into a canonical event.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Recognized event type missing a field it is required to carry.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        kind: &'static str,
        reason: String,
    },
}

/// Top-level pipeline error, one variant per stage.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WebhookError {
    /// HTTP status the webhook endpoint responds with.
    ///
    /// 4xx tells the gateway the delivery itself is bad (no point
    /// redelivering); 5xx/502 asks for a retry.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::Auth(auth) => match auth {
                AuthError::MalformedHeader(_) => 400,
                AuthError::NotFound(_) => 404,
                AuthError::GatewayUnreachable(_) => 502,
                _ => 401,
            },
            WebhookError::Normalize(_) => 400,
            WebhookError::Store(store) => match store {
                // Duplicates surface as success upstream; reaching here
                // means a constraint fired outside the guarded path.
                StoreError::Duplicate { .. } => 200,
                StoreError::Database(_) => 500,
            },
        }
    }

    /// Whether the gateway should redeliver this event later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Auth(AuthError::GatewayUnreachable(_))
                | WebhookError::Store(StoreError::Database(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_map_to_401() {
        let err = WebhookError::from(AuthError::InvalidSignature);
        assert_eq!(err.status_code(), 401);
        assert!(!err.is_retryable());
    }

    #[test]
    fn malformed_header_is_a_client_error() {
        let err = WebhookError::from(AuthError::MalformedHeader("no v1 part".into()));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn gateway_unreachable_requests_redelivery() {
        let err = WebhookError::from(AuthError::GatewayUnreachable("timeout".into()));
        assert_eq!(err.status_code(), 502);
        assert!(err.is_retryable());
    }

    #[test]
    fn store_outage_requests_redelivery() {
        let err = WebhookError::from(StoreError::database("connection refused"));
        assert_eq!(err.status_code(), 500);
        assert!(err.is_retryable());
    }

    #[test]
    fn normalize_failures_are_client_errors() {
        let err = WebhookError::from(NormalizeError::MalformedPayload {
            kind: "checkout_completed",
            reason: "metadata.user_id missing".into(),
        });
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());
    }
}

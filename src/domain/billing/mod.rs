//! Billing domain - webhook reconciliation core.
//!
//! Control flow for one delivery: verify, normalize, consult the
//! idempotency journal, reconcile against stored state, notify. The
//! verifier and normalizer are stateless; the engine owns all writes.

mod errors;
mod event;
mod normalizer;
mod payment;
mod reconciler;
mod status;
mod subscription;
mod tier;
mod user;
mod verifier;

pub use errors::{AuthError, NormalizeError, WebhookError};
pub use event::{EventKind, Gateway, GatewayEvent};
pub use normalizer::{normalize_card, normalize_wallet, CardEvent, CardEventData, WalletPayment};
pub use payment::Payment;
pub use reconciler::{
    EntitlementChange, EntitlementChangeKind, MutationSet, ReconcileOutcome, ReconciliationEngine,
};
pub use status::{BillingPeriod, EntitlementStatus, PaymentStatus, SubscriptionStatus};
pub use subscription::Subscription;
pub use tier::Tier;
pub use user::User;
pub use verifier::{sign_payload, CardSignatureVerifier, SignatureHeader};

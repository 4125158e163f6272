//! Foundation value objects shared across the billing domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::StoreError;
pub use ids::{ChatId, PaymentId, SubscriptionId, UserId};
pub use timestamp::Timestamp;

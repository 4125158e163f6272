//! Errors shared between the domain and the persistence ports.

use thiserror::Error;

/// Errors surfaced by the record store and idempotency repository.
///
/// `Duplicate` is the store's uniqueness backstop: two concurrent
/// deliveries can both pass the idempotency guard's check, but only one
/// insert wins against the unique index. The loser receives `Duplicate`
/// and the caller treats the event as already applied.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A unique constraint rejected an insert (`entity` names the row kind).
    #[error("duplicate {entity} record")]
    Duplicate { entity: &'static str },

    /// The database is unreachable or a query failed.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn duplicate(entity: &'static str) -> Self {
        StoreError::Duplicate { entity }
    }

    pub fn database(message: impl Into<String>) -> Self {
        StoreError::Database(message.into())
    }

    /// True when the gateway should redeliver the webhook later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_error_is_retryable() {
        assert!(StoreError::database("connection refused").is_retryable());
    }

    #[test]
    fn duplicate_is_not_retryable() {
        assert!(!StoreError::duplicate("payment").is_retryable());
    }

    #[test]
    fn duplicate_display_names_entity() {
        let err = StoreError::duplicate("payment");
        assert_eq!(format!("{}", err), "duplicate payment record");
    }
}

//! PostgreSQL implementation of the RecordStore port.
//!
//! All mutations for one event commit in a single transaction. The
//! unique indexes on `(gateway, gateway_payment_id)` and
//! `(gateway, gateway_subscription_id)` are the race backstop: an
//! `ON CONFLICT DO NOTHING` insert that affects zero rows surfaces as
//! [`StoreError::Duplicate`] and rolls the whole set back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{
    BillingPeriod, EntitlementStatus, Gateway, MutationSet, Payment, PaymentStatus, Subscription,
    SubscriptionStatus, Tier, User,
};
use crate::domain::foundation::{
    ChatId, PaymentId, StoreError, SubscriptionId, Timestamp, UserId,
};
use crate::ports::RecordStore;

pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ══════════════════════════════════════════════════════════════════
// Row types
// ══════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    chat_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    language_code: Option<String>,
    tier: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::from_uuid(row.id),
            chat_id: ChatId::new(row.chat_id),
            username: row.username,
            first_name: row.first_name,
            language_code: row.language_code,
            tier: parse_tier(&row.tier)?,
            status: parse_entitlement_status(&row.status)?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    gateway: String,
    gateway_subscription_id: String,
    tier: String,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    amount: Decimal,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            gateway: parse_gateway(&row.gateway)?,
            gateway_subscription_id: row.gateway_subscription_id,
            tier: parse_tier(&row.tier)?,
            status: parse_subscription_status(&row.status)?,
            current_period_start: row.current_period_start.map(Timestamp::from_datetime),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            cancel_at_period_end: row.cancel_at_period_end,
            amount: row.amount,
            currency: row.currency,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: Uuid,
    subscription_id: Option<Uuid>,
    gateway: String,
    gateway_payment_id: String,
    gateway_customer_id: Option<String>,
    amount: Decimal,
    currency: String,
    status: String,
    product_tier: String,
    billing_period: String,
    raw_payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            gateway: parse_gateway(&row.gateway)?,
            gateway_payment_id: row.gateway_payment_id,
            gateway_customer_id: row.gateway_customer_id,
            amount: row.amount,
            currency: row.currency,
            status: parse_payment_status(&row.status)?,
            product_tier: parse_tier(&row.product_tier)?,
            billing_period: parse_billing_period(&row.billing_period)?,
            raw_payload: row.raw_payload,
            created_at: Timestamp::from_datetime(row.created_at),
        })
    }
}

fn parse_gateway(s: &str) -> Result<Gateway, StoreError> {
    Gateway::parse(s).ok_or_else(|| StoreError::database(format!("invalid gateway value: {s}")))
}

fn parse_tier(s: &str) -> Result<Tier, StoreError> {
    Tier::parse(s).ok_or_else(|| StoreError::database(format!("invalid tier value: {s}")))
}

fn parse_entitlement_status(s: &str) -> Result<EntitlementStatus, StoreError> {
    EntitlementStatus::parse(s)
        .ok_or_else(|| StoreError::database(format!("invalid user status value: {s}")))
}

fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus, StoreError> {
    SubscriptionStatus::parse(s)
        .ok_or_else(|| StoreError::database(format!("invalid subscription status value: {s}")))
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus, StoreError> {
    PaymentStatus::parse(s)
        .ok_or_else(|| StoreError::database(format!("invalid payment status value: {s}")))
}

fn parse_billing_period(s: &str) -> Result<BillingPeriod, StoreError> {
    BillingPeriod::parse(s)
        .ok_or_else(|| StoreError::database(format!("invalid billing period value: {s}")))
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::database(e.to_string())
}

// ══════════════════════════════════════════════════════════════════
// Port implementation
// ══════════════════════════════════════════════════════════════════

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, chat_id, username, first_name, language_code,
                   tier, status, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(User::try_from).transpose()
    }

    async fn get_subscription(
        &self,
        gateway: Gateway,
        gateway_subscription_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, gateway, gateway_subscription_id, tier, status,
                   current_period_start, current_period_end, cancel_at_period_end,
                   amount, currency, created_at, updated_at
            FROM subscriptions
            WHERE gateway = $1 AND gateway_subscription_id = $2
            "#,
        )
        .bind(gateway.as_str())
        .bind(gateway_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Subscription::try_from).transpose()
    }

    async fn get_payment(
        &self,
        gateway: Gateway,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, subscription_id, gateway, gateway_payment_id,
                   gateway_customer_id, amount, currency, status, product_tier,
                   billing_period, raw_payload, created_at
            FROM payments
            WHERE gateway = $1 AND gateway_payment_id = $2
            "#,
        )
        .bind(gateway.as_str())
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn apply(&self, mutations: MutationSet) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(payment) = &mutations.create_payment {
            let result = sqlx::query(
                r#"
                INSERT INTO payments (
                    id, user_id, subscription_id, gateway, gateway_payment_id,
                    gateway_customer_id, amount, currency, status, product_tier,
                    billing_period, raw_payload, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (gateway, gateway_payment_id) DO NOTHING
                "#,
            )
            .bind(payment.id.as_uuid())
            .bind(payment.user_id.as_uuid())
            .bind(payment.subscription_id.map(|s| *s.as_uuid()))
            .bind(payment.gateway.as_str())
            .bind(&payment.gateway_payment_id)
            .bind(&payment.gateway_customer_id)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(payment.status.as_str())
            .bind(payment.product_tier.as_str())
            .bind(payment.billing_period.as_str())
            .bind(&payment.raw_payload)
            .bind(payment.created_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            // Zero rows means a concurrent delivery won the race.
            if result.rows_affected() == 0 {
                return Err(StoreError::duplicate("payment"));
            }
        }

        if let Some(payment) = &mutations.update_payment {
            sqlx::query(
                r#"
                UPDATE payments
                SET status = $3
                WHERE gateway = $1 AND gateway_payment_id = $2
                "#,
            )
            .bind(payment.gateway.as_str())
            .bind(&payment.gateway_payment_id)
            .bind(payment.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        if let Some(subscription) = &mutations.create_subscription {
            let result = sqlx::query(
                r#"
                INSERT INTO subscriptions (
                    id, user_id, gateway, gateway_subscription_id, tier, status,
                    current_period_start, current_period_end, cancel_at_period_end,
                    amount, currency, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (gateway, gateway_subscription_id) DO NOTHING
                "#,
            )
            .bind(subscription.id.as_uuid())
            .bind(subscription.user_id.as_uuid())
            .bind(subscription.gateway.as_str())
            .bind(&subscription.gateway_subscription_id)
            .bind(subscription.tier.as_str())
            .bind(subscription.status.as_str())
            .bind(subscription.current_period_start.map(|t| *t.as_datetime()))
            .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
            .bind(subscription.cancel_at_period_end)
            .bind(subscription.amount)
            .bind(&subscription.currency)
            .bind(subscription.created_at.as_datetime())
            .bind(subscription.updated_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::duplicate("subscription"));
            }
        }

        if let Some(subscription) = &mutations.update_subscription {
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET tier = $2, status = $3, current_period_start = $4,
                    current_period_end = $5, cancel_at_period_end = $6,
                    updated_at = $7
                WHERE id = $1
                "#,
            )
            .bind(subscription.id.as_uuid())
            .bind(subscription.tier.as_str())
            .bind(subscription.status.as_str())
            .bind(subscription.current_period_start.map(|t| *t.as_datetime()))
            .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
            .bind(subscription.cancel_at_period_end)
            .bind(subscription.updated_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        if let Some(user) = &mutations.update_user {
            sqlx::query(
                r#"
                UPDATE users
                SET tier = $2, status = $3, updated_at = $4
                WHERE id = $1
                "#,
            )
            .bind(user.id.as_uuid())
            .bind(user.tier.as_str())
            .bind(user.status.as_str())
            .bind(user.updated_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }
}

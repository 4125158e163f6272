//! PostgreSQL implementation of the WebhookEventRepository port.
//!
//! The PRIMARY KEY on `(gateway, idempotency_key)` makes `save` safe
//! under concurrent duplicate delivery: a conflicting insert only lands
//! when it replaces a pending record, and a zero row count reports
//! `AlreadyExists`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::billing::Gateway;
use crate::domain::foundation::{StoreError, Timestamp};
use crate::ports::{SaveResult, WebhookEventRecord, WebhookEventRepository};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    gateway: String,
    idempotency_key: String,
    event_kind: String,
    processed_at: DateTime<Utc>,
    result: String,
    detail: Option<String>,
    payload: serde_json::Value,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = StoreError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let gateway = Gateway::parse(&row.gateway)
            .ok_or_else(|| StoreError::database(format!("invalid gateway value: {}", row.gateway)))?;
        Ok(WebhookEventRecord {
            gateway,
            idempotency_key: row.idempotency_key,
            event_kind: row.event_kind,
            processed_at: Timestamp::from_datetime(row.processed_at),
            result: row.result,
            detail: row.detail,
            payload: row.payload,
        })
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::database(e.to_string())
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find(
        &self,
        gateway: Gateway,
        idempotency_key: &str,
    ) -> Result<Option<WebhookEventRecord>, StoreError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT gateway, idempotency_key, event_kind, processed_at,
                   result, detail, payload
            FROM webhook_events
            WHERE gateway = $1 AND idempotency_key = $2
            "#,
        )
        .bind(gateway.as_str())
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn save(&self, record: WebhookEventRecord) -> Result<SaveResult, StoreError> {
        // A conflict only replaces a prior pending record; once a
        // settled result holds the key, writers affect zero rows.
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                gateway, idempotency_key, event_kind, processed_at,
                result, detail, payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (gateway, idempotency_key) DO UPDATE
            SET result = EXCLUDED.result,
                detail = EXCLUDED.detail,
                processed_at = EXCLUDED.processed_at,
                payload = EXCLUDED.payload
            WHERE webhook_events.result = 'pending'
            "#,
        )
        .bind(record.gateway.as_str())
        .bind(&record.idempotency_key)
        .bind(&record.event_kind)
        .bind(record.processed_at.as_datetime())
        .bind(&record.result)
        .bind(&record.detail)
        .bind(&record.payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE processed_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

//! PostgreSQL-backed outbox and idempotency stores.
//!
//! The outbox table is written in the same transaction as the aggregate row
//! by the owning service; this module only reads and updates relay state.
//! Idempotency claims rely on `INSERT ... ON CONFLICT DO NOTHING` so that
//! concurrent consumers race safely on the primary key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    IdempotencyStore, MessagingError, OutboxRecord, OutboxStatus, OutboxStore, Result,
};

/// PostgreSQL outbox store.
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    /// Creates a new PostgreSQL outbox store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        let status: String = row.try_get("status")?;
        let status = OutboxStatus::parse(&status)
            .ok_or_else(|| MessagingError::Publish(format!("unknown outbox status {status}")))?;

        Ok(OutboxRecord {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            payload: row.try_get("payload")?,
            status,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn enqueue(&self, record: OutboxRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
                (id, event_type, aggregate_id, payload, status, created_at, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(&record.event_type)
        .bind(&record.aggregate_id)
        .bind(&record.payload)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.retry_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_pending(&self, batch: usize) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, payload, status,
                   created_at, published_at, retry_count, last_error
            FROM outbox_events
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(batch as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn fetch_failed(&self, max_retries: i32, batch: usize) -> Result<Vec<OutboxRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, payload, status,
                   created_at, published_at, retry_count, last_error
            FROM outbox_events
            WHERE status = 'FAILED' AND retry_count < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(max_retries)
        .bind(batch as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn mark_published(&self, id: Uuid, published_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'PUBLISHED', published_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(published_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MessagingError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'FAILED', retry_count = retry_count + 1, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MessagingError::RecordNotFound(id));
        }
        Ok(())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM outbox_events WHERE status = 'PUBLISHED' AND published_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find(&self, id: Uuid) -> Result<Option<OutboxRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, aggregate_id, payload, status,
                   created_at, published_at, retry_count, last_error
            FROM outbox_events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }
}

/// PostgreSQL idempotency store.
#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    /// Creates a new PostgreSQL idempotency store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn claim(
        &self,
        consumer: &str,
        dedup_key: &str,
        processed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (consumer, idempotency_key, processed_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (consumer, idempotency_key) DO NOTHING
            "#,
        )
        .bind(consumer)
        .bind(dedup_key)
        .bind(processed_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! Idempotency claims for at-least-once event consumption.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default claim lifetime. A duplicate delivered after its claim expired is
/// a known, accepted risk; seven days comfortably exceeds broker retention
/// plus redelivery windows.
pub const DEFAULT_DEDUP_TTL_DAYS: i64 = 7;

/// A processed-message claim: `(consumer, dedup_key)` is unique.
///
/// Claims are only ever inserted or expired, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub consumer: String,
    pub dedup_key: String,
    pub processed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Builds the dedup key from a delivery's coordinates.
///
/// `(topic, partition key, offset)` uniquely identifies a delivery, so the
/// same key is computed no matter how many times the broker redelivers.
pub fn dedup_key(topic: &str, key: &str, offset: i64) -> String {
    format!("{topic}:{key}:{offset}")
}

/// Store for idempotency claims.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Attempts to claim a dedup key for a consumer.
    ///
    /// Semantics are insert-if-absent: returns `true` if the claim was
    /// inserted (the caller must process), `false` if a claim already
    /// existed (duplicate, skip side effects).
    async fn claim(
        &self,
        consumer: &str,
        dedup_key: &str,
        processed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Removes expired claims; returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Wraps an [`IdempotencyStore`] with the delivery-coordinate key scheme
/// and a claim TTL.
///
/// The claim must be taken *before* any side-effecting work in a handler,
/// so two concurrent deliveries of the same message race on the
/// conditional insert rather than on the side effects.
#[derive(Debug, Clone)]
pub struct IdempotentConsumer<S> {
    store: S,
    ttl: Duration,
}

impl<S: IdempotencyStore> IdempotentConsumer<S> {
    /// Creates a wrapper with the default 7-day claim TTL.
    pub fn new(store: S) -> Self {
        Self {
            store,
            ttl: Duration::days(DEFAULT_DEDUP_TTL_DAYS),
        }
    }

    /// Creates a wrapper with an explicit claim TTL.
    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Returns `true` exactly once per `(topic, key, offset)` per consumer
    /// within the claim TTL.
    pub async fn should_process(
        &self,
        consumer: &str,
        topic: &str,
        key: &str,
        offset: i64,
    ) -> Result<bool> {
        let dedup = dedup_key(topic, key, offset);
        let now = Utc::now();
        let claimed = self
            .store
            .claim(consumer, &dedup, now, now + self.ttl)
            .await?;
        if !claimed {
            metrics::counter!("consumer_duplicates_skipped", "consumer" => consumer.to_string())
                .increment(1);
            tracing::debug!(consumer, %dedup, "duplicate delivery skipped");
        }
        Ok(claimed)
    }

    /// Removes expired claims from the underlying store.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.store.purge_expired(Utc::now()).await
    }
}

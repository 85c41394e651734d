//! Outbox records and the store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use events::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Publication status of an outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OutboxStatus {
    /// Awaiting publication.
    #[default]
    Pending,

    /// Acknowledged by the broker (terminal success).
    Published,

    /// Last publish attempt failed; retried until `retry_count` reaches the
    /// relay's limit, after which the record is parked for an operator.
    Failed,
}

impl OutboxStatus {
    /// Returns the status as its persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    /// Parses the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "PUBLISHED" => Some(OutboxStatus::Published),
            "FAILED" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A domain event awaiting publication, persisted alongside the aggregate
/// change that produced it.
///
/// Invariant: records are only ever created inside the same unit of work as
/// the aggregate mutation they describe; the relay is the only component
/// that publishes, never the mutating service itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    /// Unique record ID.
    pub id: Uuid,

    /// Event type tag, used for topic routing without deserializing.
    pub event_type: String,

    /// Aggregate ID, used as the publish partition key.
    pub aggregate_id: String,

    /// Serialized event payload.
    pub payload: serde_json::Value,

    /// Current publication status.
    pub status: OutboxStatus,

    /// When the record was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the record was published, if it has been.
    pub published_at: Option<DateTime<Utc>>,

    /// Number of failed publish attempts so far.
    pub retry_count: i32,

    /// Error message from the last failed attempt.
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// Creates a pending record for a domain event, keyed by its order.
    pub fn for_event(event: &DomainEvent) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.order_id().to_string(),
            payload: serde_json::to_value(event)?,
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            published_at: None,
            retry_count: 0,
            last_error: None,
        })
    }

    /// Returns true if the record has exhausted its retries.
    pub fn is_parked(&self, max_retries: i32) -> bool {
        self.status == OutboxStatus::Failed && self.retry_count >= max_retries
    }
}

/// Durable store for a service's outbound events.
///
/// Each service owns one outbox; the relay drains it. All mutations commit
/// atomically with respect to the store's own persistence guarantees.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persists a new pending record.
    async fn enqueue(&self, record: OutboxRecord) -> Result<()>;

    /// Fetches pending records, oldest first, bounded by `batch`.
    ///
    /// Oldest-first keeps staleness bounded and preserves rough causal
    /// order within an aggregate.
    async fn fetch_pending(&self, batch: usize) -> Result<Vec<OutboxRecord>>;

    /// Fetches failed records still eligible for retry
    /// (`retry_count < max_retries`), oldest first, bounded by `batch`.
    async fn fetch_failed(&self, max_retries: i32, batch: usize) -> Result<Vec<OutboxRecord>>;

    /// Marks a record as published at the given time.
    async fn mark_published(&self, id: Uuid, published_at: DateTime<Utc>) -> Result<()>;

    /// Marks a record as failed, incrementing its retry count and recording
    /// the error.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Deletes published records older than the cutoff. Returns the number
    /// deleted.
    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Looks up a record by ID.
    async fn find(&self, id: Uuid) -> Result<Option<OutboxRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Money, OrderId, PaymentId};

    #[test]
    fn status_string_roundtrip() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            assert_eq!(OutboxStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OutboxStatus::parse("bogus"), None);
    }

    #[test]
    fn record_for_event_keys_by_order() {
        let order_id = OrderId::new();
        let event =
            DomainEvent::payment_authorized(order_id, PaymentId::new(), Money::from_cents(100));
        let record = OutboxRecord::for_event(&event).unwrap();

        assert_eq!(record.event_type, "PaymentAuthorized");
        assert_eq!(record.aggregate_id, order_id.to_string());
        assert_eq!(record.status, OutboxStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.published_at.is_none());
    }

    #[test]
    fn parked_requires_failed_and_exhausted_retries() {
        let event = DomainEvent::order_completed(OrderId::new());
        let mut record = OutboxRecord::for_event(&event).unwrap();

        assert!(!record.is_parked(3));
        record.status = OutboxStatus::Failed;
        record.retry_count = 2;
        assert!(!record.is_parked(3));
        record.retry_count = 3;
        assert!(record.is_parked(3));
    }
}

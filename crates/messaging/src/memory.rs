//! In-memory implementations of the broker and stores.
//!
//! These back the tests and the default single-process binary. They provide
//! the same contracts as the PostgreSQL implementations: conditional-insert
//! claims, oldest-first outbox scans, and per-group broker cursors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    Broker, Delivery, IdempotencyRecord, IdempotencyStore, MessagingError, OutboxRecord,
    OutboxStatus, OutboxStore, Result,
};

#[derive(Default)]
struct BrokerState {
    /// Append-only log per topic. Offset = index.
    logs: HashMap<String, Vec<(String, serde_json::Value)>>,
    /// Committed position per (group, topic).
    cursors: HashMap<(String, String), usize>,
    /// When set, the next `n` publishes fail. Test hook for relay failure
    /// paths.
    fail_next_publishes: u32,
}

/// In-memory broker with per-group committed cursors.
///
/// Ordering holds within a topic (and therefore within a partition key);
/// delivery is at-least-once because a delivery stays visible until its
/// offset is committed.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a new empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` publish calls fail. Used to exercise the relay's
    /// FAILED/retry path.
    pub async fn fail_next_publishes(&self, n: u32) {
        self.state.write().await.fail_next_publishes = n;
    }

    /// Returns the number of messages on a topic.
    pub async fn topic_len(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .logs
            .get(topic)
            .map_or(0, |log| log.len())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, key: &str, payload: &serde_json::Value) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_next_publishes > 0 {
            state.fail_next_publishes -= 1;
            return Err(MessagingError::Publish("broker unavailable".to_string()));
        }
        state
            .logs
            .entry(topic.to_string())
            .or_default()
            .push((key.to_string(), payload.clone()));
        Ok(())
    }

    async fn poll(&self, group: &str, topics: &[&str], max: usize) -> Result<Vec<Delivery>> {
        let state = self.state.read().await;
        let mut batch = Vec::new();

        for &topic in topics {
            let available = state.logs.get(topic).map_or(0, |log| log.len());
            let cursor_key = (group.to_string(), topic.to_string());
            let mut cursor = state.cursors.get(&cursor_key).copied().unwrap_or(0);

            while cursor < available && batch.len() < max {
                let (key, payload) = state.logs[topic][cursor].clone();
                batch.push(Delivery {
                    topic: topic.to_string(),
                    key,
                    offset: cursor as i64,
                    payload,
                });
                cursor += 1;
            }

            if batch.len() >= max {
                break;
            }
        }

        Ok(batch)
    }

    async fn commit(&self, group: &str, topic: &str, offset: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let cursor = state
            .cursors
            .entry((group.to_string(), topic.to_string()))
            .or_insert(0);
        *cursor = (*cursor).max(offset.max(0) as usize);
        Ok(())
    }

    async fn rewind_group(&self, group: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.cursors.retain(|(g, _), _| g != group);
        Ok(())
    }
}

/// In-memory outbox store.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    records: Arc<RwLock<Vec<OutboxRecord>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records in each status. Test and operator
    /// convenience.
    pub async fn status_counts(&self) -> HashMap<OutboxStatus, usize> {
        let records = self.records.read().await;
        let mut counts = HashMap::new();
        for record in records.iter() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn enqueue(&self, record: OutboxRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn fetch_pending(&self, batch: usize) -> Result<Vec<OutboxRecord>> {
        let records = self.records.read().await;
        let mut pending: Vec<_> = records
            .iter()
            .filter(|r| r.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.truncate(batch);
        Ok(pending)
    }

    async fn fetch_failed(&self, max_retries: i32, batch: usize) -> Result<Vec<OutboxRecord>> {
        let records = self.records.read().await;
        let mut failed: Vec<_> = records
            .iter()
            .filter(|r| r.status == OutboxStatus::Failed && r.retry_count < max_retries)
            .cloned()
            .collect();
        failed.sort_by_key(|r| r.created_at);
        failed.truncate(batch);
        Ok(failed)
    }

    async fn mark_published(&self, id: Uuid, published_at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(MessagingError::RecordNotFound(id))?;
        record.status = OutboxStatus::Published;
        record.published_at = Some(published_at);
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(MessagingError::RecordNotFound(id))?;
        record.status = OutboxStatus::Failed;
        record.retry_count += 1;
        record.last_error = Some(error.to_string());
        Ok(())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| {
            !(r.status == OutboxStatus::Published
                && r.published_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - records.len()) as u64)
    }

    async fn find(&self, id: Uuid) -> Result<Option<OutboxRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}

/// In-memory idempotency store.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    claims: Arc<RwLock<HashMap<(String, String), IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live claims.
    pub async fn claim_count(&self) -> usize {
        self.claims.read().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(
        &self,
        consumer: &str,
        dedup_key: &str,
        processed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut claims = self.claims.write().await;
        let key = (consumer.to_string(), dedup_key.to_string());
        if claims.contains_key(&key) {
            return Ok(false);
        }
        claims.insert(
            key,
            IdempotencyRecord {
                consumer: consumer.to_string(),
                dedup_key: dedup_key.to_string(),
                processed_at,
                expires_at,
            },
        );
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut claims = self.claims.write().await;
        let before = claims.len();
        claims.retain(|_, record| record.expires_at > now);
        Ok((before - claims.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use events::DomainEvent;

    fn record(event: &DomainEvent) -> OutboxRecord {
        OutboxRecord::for_event(event).unwrap()
    }

    #[tokio::test]
    async fn broker_redelivers_until_committed() {
        let broker = InMemoryBroker::new();
        let payload = serde_json::json!({"n": 1});
        broker.publish("order-events", "k1", &payload).await.unwrap();
        broker.publish("order-events", "k2", &payload).await.unwrap();

        let first = broker.poll("g1", &["order-events"], 10).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].offset, 0);
        assert_eq!(first[1].offset, 1);

        // Uncommitted deliveries come back on the next poll.
        let again = broker.poll("g1", &["order-events"], 10).await.unwrap();
        assert_eq!(again.len(), 2);

        broker.commit("g1", "order-events", 2).await.unwrap();
        let after = broker.poll("g1", &["order-events"], 10).await.unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn broker_partial_commit_resumes_mid_topic() {
        let broker = InMemoryBroker::new();
        let payload = serde_json::json!({});
        for _ in 0..3 {
            broker.publish("order-events", "k", &payload).await.unwrap();
        }

        broker.poll("g1", &["order-events"], 10).await.unwrap();
        broker.commit("g1", "order-events", 1).await.unwrap();

        let rest = broker.poll("g1", &["order-events"], 10).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].offset, 1);
    }

    #[tokio::test]
    async fn broker_commit_never_moves_backwards() {
        let broker = InMemoryBroker::new();
        let payload = serde_json::json!({});
        broker.publish("order-events", "k", &payload).await.unwrap();
        broker.publish("order-events", "k", &payload).await.unwrap();

        broker.commit("g1", "order-events", 2).await.unwrap();
        broker.commit("g1", "order-events", 1).await.unwrap();

        assert!(broker.poll("g1", &["order-events"], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn broker_groups_are_independent() {
        let broker = InMemoryBroker::new();
        let payload = serde_json::json!({});
        broker.publish("order-events", "k", &payload).await.unwrap();

        assert_eq!(broker.poll("g1", &["order-events"], 10).await.unwrap().len(), 1);
        assert_eq!(broker.poll("g2", &["order-events"], 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broker_rewind_redelivers_from_earliest() {
        let broker = InMemoryBroker::new();
        let payload = serde_json::json!({});
        broker.publish("order-events", "k", &payload).await.unwrap();
        broker.publish("payment-events", "k", &payload).await.unwrap();

        let topics = ["order-events", "payment-events"];
        assert_eq!(broker.poll("g1", &topics, 10).await.unwrap().len(), 2);
        broker.commit("g1", "order-events", 1).await.unwrap();
        broker.commit("g1", "payment-events", 1).await.unwrap();
        assert!(broker.poll("g1", &topics, 10).await.unwrap().is_empty());

        broker.rewind_group("g1").await.unwrap();
        assert_eq!(broker.poll("g1", &topics, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn broker_poll_respects_max() {
        let broker = InMemoryBroker::new();
        let payload = serde_json::json!({});
        for _ in 0..5 {
            broker.publish("order-events", "k", &payload).await.unwrap();
        }

        assert_eq!(broker.poll("g", &["order-events"], 3).await.unwrap().len(), 3);
        broker.commit("g", "order-events", 3).await.unwrap();
        assert_eq!(broker.poll("g", &["order-events"], 3).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn broker_fail_next_publishes() {
        let broker = InMemoryBroker::new();
        broker.fail_next_publishes(1).await;
        let payload = serde_json::json!({});

        assert!(broker.publish("order-events", "k", &payload).await.is_err());
        assert!(broker.publish("order-events", "k", &payload).await.is_ok());
        assert_eq!(broker.topic_len("order-events").await, 1);
    }

    #[tokio::test]
    async fn outbox_fetch_pending_is_oldest_first() {
        let store = InMemoryOutboxStore::new();
        let mut older = record(&DomainEvent::order_completed(OrderId::new()));
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        let newer = record(&DomainEvent::order_completed(OrderId::new()));

        store.enqueue(newer.clone()).await.unwrap();
        store.enqueue(older.clone()).await.unwrap();

        let pending = store.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, older.id);
        assert_eq!(pending[1].id, newer.id);
    }

    #[tokio::test]
    async fn outbox_mark_failed_increments_retry_count() {
        let store = InMemoryOutboxStore::new();
        let r = record(&DomainEvent::order_completed(OrderId::new()));
        let id = r.id;
        store.enqueue(r).await.unwrap();

        store.mark_failed(id, "broker unavailable").await.unwrap();
        store.mark_failed(id, "still down").await.unwrap();

        let found = store.find(id).await.unwrap().unwrap();
        assert_eq!(found.status, OutboxStatus::Failed);
        assert_eq!(found.retry_count, 2);
        assert_eq!(found.last_error.as_deref(), Some("still down"));
    }

    #[tokio::test]
    async fn outbox_fetch_failed_excludes_exhausted() {
        let store = InMemoryOutboxStore::new();
        let r = record(&DomainEvent::order_completed(OrderId::new()));
        let id = r.id;
        store.enqueue(r).await.unwrap();

        for _ in 0..3 {
            store.mark_failed(id, "err").await.unwrap();
        }

        assert!(store.fetch_failed(3, 10).await.unwrap().is_empty());
        assert_eq!(store.fetch_failed(4, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outbox_cleanup_only_removes_old_published() {
        let store = InMemoryOutboxStore::new();
        let pending = record(&DomainEvent::order_completed(OrderId::new()));
        let published = record(&DomainEvent::order_completed(OrderId::new()));
        let published_id = published.id;
        store.enqueue(pending.clone()).await.unwrap();
        store.enqueue(published).await.unwrap();

        let long_ago = Utc::now() - chrono::Duration::days(3);
        store.mark_published(published_id, long_ago).await.unwrap();

        let deleted = store
            .delete_published_before(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.find(published_id).await.unwrap().is_none());
        assert!(store.find(pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn idempotency_claim_is_insert_if_absent() {
        let store = InMemoryIdempotencyStore::new();
        let now = Utc::now();
        let exp = now + chrono::Duration::days(7);

        assert!(store.claim("c", "k", now, exp).await.unwrap());
        assert!(!store.claim("c", "k", now, exp).await.unwrap());
        assert_eq!(store.claim_count().await, 1);
    }
}

//! Broker contract consumed by the relay and the event consumers.

use async_trait::async_trait;

use crate::Result;

/// A single message delivered from the broker.
///
/// `(topic, key, offset)` are the delivery coordinates the idempotency
/// layer builds its dedup key from.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Topic the message was read from.
    pub topic: String,

    /// Partition key it was published with (the aggregate ID).
    pub key: String,

    /// Offset of the message within the topic.
    pub offset: i64,

    /// The serialized event payload.
    pub payload: serde_json::Value,
}

/// Minimal broker contract: keyed publish and consumer-group polling.
///
/// The broker guarantees at-least-once delivery and ordering only within a
/// partition key; everything stronger is built on top in this crate.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a payload to a topic, keyed for per-aggregate ordering.
    ///
    /// Returns once the broker has acknowledged the write.
    async fn publish(&self, topic: &str, key: &str, payload: &serde_json::Value) -> Result<()>;

    /// Polls the next batch of messages for a consumer group.
    ///
    /// Each group tracks its own committed position per topic. Polling does
    /// not move that position: the same deliveries come back until they are
    /// acknowledged through [`Broker::commit`]. Returns an empty batch when
    /// the group is caught up.
    async fn poll(&self, group: &str, topics: &[&str], max: usize) -> Result<Vec<Delivery>>;

    /// Advances a consumer group's committed position on a topic.
    ///
    /// `offset` is the next offset the group should read, one past the last
    /// delivery it finished processing. Positions never move backwards
    /// except through [`Broker::rewind_group`].
    async fn commit(&self, group: &str, topic: &str, offset: i64) -> Result<()>;

    /// Resets a consumer group to the earliest offset on every topic.
    ///
    /// Used by read-model replay to re-fold the whole event log.
    async fn rewind_group(&self, group: &str) -> Result<()>;
}

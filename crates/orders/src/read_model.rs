//! Order read model: a denormalized per-order summary folded from the
//! event stream.
//!
//! Every handler is an upsert keyed by the order ID, so replaying an event
//! leaves the same final state. The view is disposable: `replay_all` rebuilds
//! it from the earliest offset of every domain topic through a dedicated
//! consumer group.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Currency, CustomerId, Money, OrderId, PaymentId};
use events::{ALL_TOPICS, DomainEvent};
use messaging::{Broker, EventHandler, HandlerError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::order::OrderStatus;

/// Consumer group for live projection.
pub const PROJECTOR_CONSUMER: &str = "order-read-model";

/// Dedicated group used by replay so the live group's cursors are untouched.
const REPLAY_CONSUMER: &str = "order-read-model-replay";

/// Denormalized view of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub status: OrderStatus,
    pub total_amount: Option<Money>,
    pub currency: Option<Currency>,
    pub payment_id: Option<PaymentId>,
    pub cancellation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSummary {
    fn empty(order_id: OrderId) -> Self {
        Self {
            order_id,
            customer_id: None,
            status: OrderStatus::Pending,
            total_amount: None,
            currency: None,
            payment_id: None,
            cancellation_reason: None,
            updated_at: Utc::now(),
        }
    }
}

/// In-memory summary storage.
#[derive(Clone, Default)]
pub struct OrderSummaryStore {
    summaries: Arc<RwLock<HashMap<OrderId, OrderSummary>>>,
}

impl OrderSummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: OrderId) -> Option<OrderSummary> {
        self.summaries.read().await.get(&order_id).cloned()
    }

    pub async fn list(&self) -> Vec<OrderSummary> {
        let summaries = self.summaries.read().await;
        let mut all: Vec<_> = summaries.values().cloned().collect();
        all.sort_by_key(|s| s.updated_at);
        all
    }

    pub async fn clear(&self) {
        self.summaries.write().await.clear();
    }

    async fn upsert<F>(&self, order_id: OrderId, apply: F)
    where
        F: FnOnce(&mut OrderSummary),
    {
        let mut summaries = self.summaries.write().await;
        let summary = summaries
            .entry(order_id)
            .or_insert_with(|| OrderSummary::empty(order_id));
        apply(summary);
        summary.updated_at = Utc::now();
    }
}

/// Folds domain events into [`OrderSummary`] rows.
pub struct OrderProjector {
    store: OrderSummaryStore,
}

impl OrderProjector {
    pub fn new(store: OrderSummaryStore) -> Self {
        Self { store }
    }

    /// Applies one event to the view.
    pub async fn apply(&self, event: &DomainEvent) {
        let order_id = event.order_id();
        match event {
            DomainEvent::OrderCreated(data) => {
                let data = data.clone();
                self.store
                    .upsert(order_id, move |s| {
                        s.customer_id = Some(data.customer_id);
                        s.total_amount = Some(data.total_amount);
                        s.currency = Some(data.currency);
                        // The service advances to PaymentPending in the same
                        // unit of work that emits this event.
                        s.status = OrderStatus::PaymentPending;
                    })
                    .await;
            }
            DomainEvent::PaymentAuthorized(data) => {
                let payment_id = data.payment_id;
                self.store
                    .upsert(order_id, move |s| {
                        s.payment_id = Some(payment_id);
                        if s.status == OrderStatus::PaymentPending {
                            s.status = OrderStatus::InventoryPending;
                        }
                    })
                    .await;
            }
            DomainEvent::PaymentDeclined(data) => {
                let reason = data.reason.clone();
                self.store
                    .upsert(order_id, move |s| {
                        s.status = OrderStatus::Cancelled;
                        s.cancellation_reason = Some(reason);
                    })
                    .await;
            }
            DomainEvent::OrderCompleted(_) => {
                self.store
                    .upsert(order_id, |s| s.status = OrderStatus::Completed)
                    .await;
            }
            DomainEvent::OrderCancelled(data) => {
                let reason = data.reason.clone();
                self.store
                    .upsert(order_id, move |s| {
                        s.status = OrderStatus::Cancelled;
                        s.cancellation_reason = Some(reason);
                    })
                    .await;
            }
            // Reservation outcomes resolve through OrderCompleted or
            // OrderCancelled; compensation confirmations change nothing.
            DomainEvent::InventoryReserved(_)
            | DomainEvent::InventoryInsufficient(_)
            | DomainEvent::InventoryReleased(_)
            | DomainEvent::PaymentReversed(_) => {}
        }
    }

    /// Rebuilds the view from the earliest offset of every topic.
    ///
    /// Returns the number of events folded.
    #[tracing::instrument(skip(self, broker))]
    pub async fn replay_all<B: Broker>(&self, broker: &B) -> messaging::Result<u64> {
        self.store.clear().await;
        broker.rewind_group(REPLAY_CONSUMER).await?;

        let mut folded = 0u64;
        loop {
            let batch = broker.poll(REPLAY_CONSUMER, ALL_TOPICS, 100).await?;
            if batch.is_empty() {
                break;
            }
            for delivery in batch {
                if let Some(event) = DomainEvent::decode(&delivery.payload)? {
                    self.apply(&event).await;
                    folded += 1;
                }
                broker
                    .commit(REPLAY_CONSUMER, &delivery.topic, delivery.offset + 1)
                    .await?;
            }
        }

        tracing::info!(folded, "read model replay finished");
        metrics::counter!("read_model_replays").increment(1);
        Ok(folded)
    }
}

#[async_trait]
impl EventHandler for OrderProjector {
    fn consumer_name(&self) -> &str {
        PROJECTOR_CONSUMER
    }

    fn topics(&self) -> Vec<&'static str> {
        ALL_TOPICS.to_vec()
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.apply(event).await;
        Ok(())
    }
}

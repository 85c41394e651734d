//! Order persistence trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::error::{OrderError, Result};
use crate::order::Order;

/// Storage boundary for the order aggregate.
///
/// Updates are guarded by the aggregate's optimistic `version`: the write
/// applies only when the stored version matches the caller's copy, and the
/// version is bumped as part of the write.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<()>;

    async fn find(&self, id: OrderId) -> Result<Option<Order>>;

    /// Persists `order` and returns the copy with the bumped version.
    ///
    /// Fails with [`OrderError::Conflict`] when another writer got there
    /// first; the caller must abandon its unit of work.
    async fn update(&self, order: &Order) -> Result<Order>;

    async fn list(&self) -> Result<Vec<Order>>;
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order);
        Ok(())
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or(OrderError::NotFound(order.id))?;

        if stored.version != order.version {
            return Err(OrderError::Conflict {
                order_id: order.id,
                expected: order.version,
            });
        }

        let mut updated = order.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<_> = orders.values().cloned().collect();
        all.sort_by_key(|o| o.created_at);
        Ok(all)
    }
}

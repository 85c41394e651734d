//! Inventory persistence trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId, Sku};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{InventoryError, Result};
use crate::item::InventoryItem;
use crate::reservation::InventoryReservation;

/// One requested line of an order, cached from `OrderCreated` until the
/// payment outcome arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub sku: Sku,
    pub quantity: u32,
}

/// Storage boundary for the inventory service.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn upsert_item(&self, item: InventoryItem) -> Result<()>;

    async fn find_item(&self, sku: &Sku) -> Result<Option<InventoryItem>>;

    async fn list_items(&self) -> Result<Vec<InventoryItem>>;

    /// Applies item updates and reservation writes atomically.
    ///
    /// Every item's version must match the stored version, else nothing is
    /// applied and [`InventoryError::Conflict`] is returned. Versions are
    /// bumped as part of the commit. Reservations are inserted or replaced
    /// by ID.
    async fn commit(
        &self,
        items: Vec<InventoryItem>,
        reservations: Vec<InventoryReservation>,
    ) -> Result<()>;

    /// ACTIVE reservations belonging to one order.
    async fn active_reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<InventoryReservation>>;

    /// ACTIVE reservations whose `expires_at` is before `now`.
    async fn expired_active_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InventoryReservation>>;

    async fn find_reservation(&self, id: ReservationId) -> Result<Option<InventoryReservation>>;

    async fn put_order_request(&self, order_id: OrderId, items: Vec<RequestedItem>) -> Result<()>;

    async fn get_order_request(&self, order_id: OrderId) -> Result<Option<Vec<RequestedItem>>>;
}

#[derive(Default)]
struct InMemoryState {
    items: HashMap<Sku, InventoryItem>,
    reservations: HashMap<ReservationId, InventoryReservation>,
    order_requests: HashMap<OrderId, Vec<RequestedItem>>,
    fail_next_commits: u32,
}

/// In-memory inventory store.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` commit calls fail with a conflict. Test hook for
    /// the conflict-reported-as-insufficient rule.
    pub async fn fail_next_commits(&self, n: u32) {
        self.state.write().await.fail_next_commits = n;
    }

    /// Returns the number of reservations in any status.
    pub async fn reservation_count(&self) -> usize {
        self.state.read().await.reservations.len()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn upsert_item(&self, item: InventoryItem) -> Result<()> {
        self.state.write().await.items.insert(item.sku.clone(), item);
        Ok(())
    }

    async fn find_item(&self, sku: &Sku) -> Result<Option<InventoryItem>> {
        Ok(self.state.read().await.items.get(sku).cloned())
    }

    async fn list_items(&self) -> Result<Vec<InventoryItem>> {
        let state = self.state.read().await;
        let mut all: Vec<_> = state.items.values().cloned().collect();
        all.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(all)
    }

    async fn commit(
        &self,
        items: Vec<InventoryItem>,
        reservations: Vec<InventoryReservation>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if state.fail_next_commits > 0 {
            state.fail_next_commits -= 1;
            let sku = items
                .first()
                .map(|i| i.sku.clone())
                .unwrap_or_else(|| Sku::new("unknown"));
            return Err(InventoryError::Conflict(sku));
        }

        // Validate every version before applying anything.
        for item in &items {
            let stored = state
                .items
                .get(&item.sku)
                .ok_or_else(|| InventoryError::ItemNotFound(item.sku.clone()))?;
            if stored.version != item.version {
                return Err(InventoryError::Conflict(item.sku.clone()));
            }
        }

        for mut item in items {
            item.version += 1;
            state.items.insert(item.sku.clone(), item);
        }
        for reservation in reservations {
            state.reservations.insert(reservation.id, reservation);
        }
        Ok(())
    }

    async fn active_reservations_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<InventoryReservation>> {
        let state = self.state.read().await;
        let mut active: Vec<_> = state
            .reservations
            .values()
            .filter(|r| {
                r.order_id == order_id
                    && r.status == crate::reservation::ReservationStatus::Active
            })
            .cloned()
            .collect();
        active.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(active)
    }

    async fn expired_active_reservations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<InventoryReservation>> {
        let state = self.state.read().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn find_reservation(&self, id: ReservationId) -> Result<Option<InventoryReservation>> {
        Ok(self.state.read().await.reservations.get(&id).cloned())
    }

    async fn put_order_request(&self, order_id: OrderId, items: Vec<RequestedItem>) -> Result<()> {
        self.state
            .write()
            .await
            .order_requests
            .insert(order_id, items);
        Ok(())
    }

    async fn get_order_request(&self, order_id: OrderId) -> Result<Option<Vec<RequestedItem>>> {
        Ok(self.state.read().await.order_requests.get(&order_id).cloned())
    }
}

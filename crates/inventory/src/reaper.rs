//! Background reclaim of expired reservations.
//!
//! The reaper is the backstop for orders whose saga stalled: a lost event
//! will never release the holds, so stock would stay reserved forever. The
//! scan groups expired ACTIVE reservations by order and releases each order
//! as one unit, emitting the same `InventoryReleased` event as a regular
//! release.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::OrderId;
use messaging::OutboxStore;
use tokio::sync::watch;

use crate::error::Result;
use crate::service::InventoryService;
use crate::store::InventoryStore;

/// Default time between expiry scans.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

pub struct ExpiryReaper<S, O> {
    service: Arc<InventoryService<S, O>>,
    scan_interval: Duration,
    store: S,
}

impl<S, O> ExpiryReaper<S, O>
where
    S: InventoryStore + Clone,
    O: OutboxStore,
{
    pub fn new(service: Arc<InventoryService<S, O>>, store: S) -> Self {
        Self::with_interval(service, store, DEFAULT_SCAN_INTERVAL)
    }

    pub fn with_interval(
        service: Arc<InventoryService<S, O>>,
        store: S,
        scan_interval: Duration,
    ) -> Self {
        Self {
            service,
            scan_interval,
            store,
        }
    }

    /// Runs one scan. Returns the number of orders released.
    #[tracing::instrument(skip(self))]
    pub async fn scan_once(&self) -> Result<usize> {
        let expired = self.store.expired_active_reservations(Utc::now()).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let orders: HashSet<OrderId> = expired.iter().map(|r| r.order_id).collect();
        let mut released_orders = 0;

        for order_id in orders {
            match self.service.release_for_order(order_id).await {
                Ok(released) if !released.is_empty() => {
                    released_orders += 1;
                    metrics::counter!("inventory_reservations_expired")
                        .increment(released.len() as u64);
                    tracing::warn!(
                        order_id = %order_id,
                        reservations = released.len(),
                        "released expired reservations"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    // Next scan picks the order up again.
                    tracing::error!(order_id = %order_id, error = %err, "expiry release failed");
                }
            }
        }

        Ok(released_orders)
    }

    /// Runs the scan loop until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut scan = tokio::time::interval(self.scan_interval);
        loop {
            tokio::select! {
                _ = scan.tick() => {
                    if let Err(err) = self.scan_once().await {
                        tracing::error!(error = %err, "expiry scan failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("expiry reaper shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::Sku;
    use messaging::InMemoryOutboxStore;

    use crate::reservation::ReservationStatus;
    use crate::store::{InMemoryInventoryStore, InventoryStore, RequestedItem};

    type Service = InventoryService<InMemoryInventoryStore, InMemoryOutboxStore>;

    fn setup_with_ttl(ttl: ChronoDuration) -> (Arc<Service>, InMemoryInventoryStore, ExpiryReaper<InMemoryInventoryStore, InMemoryOutboxStore>) {
        let store = InMemoryInventoryStore::new();
        let outbox = InMemoryOutboxStore::new();
        let service = Arc::new(InventoryService::with_ttl(store.clone(), outbox, ttl));
        let reaper = ExpiryReaper::new(service.clone(), store.clone());
        (service, store, reaper)
    }

    fn line(sku: &str, quantity: u32) -> RequestedItem {
        RequestedItem {
            sku: Sku::new(sku),
            quantity,
        }
    }

    #[tokio::test]
    async fn expired_reservation_is_released_on_scan() {
        // Negative TTL: reservations are born expired.
        let (service, store, reaper) = setup_with_ttl(ChronoDuration::minutes(-1));
        service.set_stock(Sku::new("SKU-1"), 10).await.unwrap();
        let order_id = common::OrderId::new();
        service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let released = reaper.scan_once().await.unwrap();

        assert_eq!(released, 1);
        let item = service.get_item(&Sku::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.available_quantity, 10);
        assert_eq!(item.reserved_quantity, 0);

        let active = store.active_reservations_for_order(order_id).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn reservations_sharing_an_order_release_together() {
        let (service, store, reaper) = setup_with_ttl(ChronoDuration::minutes(-1));
        service.set_stock(Sku::new("SKU-1"), 10).await.unwrap();
        service.set_stock(Sku::new("SKU-2"), 10).await.unwrap();
        let order_id = common::OrderId::new();
        service
            .reserve_for_order(order_id, &[line("SKU-1", 2), line("SKU-2", 3)])
            .await
            .unwrap();

        let released = reaper.scan_once().await.unwrap();

        // Two reservations, one order, one release.
        assert_eq!(released, 1);
        for sku in ["SKU-1", "SKU-2"] {
            let item = service.get_item(&Sku::new(sku)).await.unwrap().unwrap();
            assert_eq!(item.reserved_quantity, 0);
        }
        assert!(
            store
                .active_reservations_for_order(order_id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn fresh_reservations_survive_the_scan() {
        let (service, store, reaper) = setup_with_ttl(ChronoDuration::minutes(15));
        service.set_stock(Sku::new("SKU-1"), 10).await.unwrap();
        let order_id = common::OrderId::new();
        service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let released = reaper.scan_once().await.unwrap();

        assert_eq!(released, 0);
        let active = store.active_reservations_for_order(order_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, ReservationStatus::Active);
    }

    #[tokio::test]
    async fn empty_scan_is_a_noop() {
        let (_service, _store, reaper) = setup_with_ttl(ChronoDuration::minutes(15));
        assert_eq!(reaper.scan_once().await.unwrap(), 0);
    }
}

//! Reservation engine: all-or-nothing reserve, release, and confirm.

use chrono::Duration;
use common::{OrderId, Sku};
use events::{DomainEvent, InsufficientItem, ReleasedItem, ReservedItem};
use messaging::{OutboxRecord, OutboxStore};

use crate::error::{InventoryError, Result};
use crate::item::InventoryItem;
use crate::reservation::{DEFAULT_RESERVATION_TTL_MINUTES, InventoryReservation};
use crate::store::{InventoryStore, RequestedItem};

/// Outcome of a reservation attempt.
#[derive(Debug)]
pub enum ReserveOutcome {
    /// All lines reserved, `InventoryReserved` outboxed.
    Reserved(Vec<InventoryReservation>),
    /// At least one line fell short, nothing reserved,
    /// `InventoryInsufficient` outboxed with every shortfall.
    Insufficient(Vec<InsufficientItem>),
}

pub struct InventoryService<S, O> {
    store: S,
    outbox: O,
    reservation_ttl: Duration,
}

impl<S, O> InventoryService<S, O>
where
    S: InventoryStore,
    O: OutboxStore,
{
    pub fn new(store: S, outbox: O) -> Self {
        Self::with_ttl(store, outbox, Duration::minutes(DEFAULT_RESERVATION_TTL_MINUTES))
    }

    pub fn with_ttl(store: S, outbox: O, reservation_ttl: Duration) -> Self {
        Self {
            store,
            outbox,
            reservation_ttl,
        }
    }

    /// Admin upsert of available stock for a SKU. Reserved quantity is
    /// untouched.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, sku: Sku, available: u32) -> Result<InventoryItem> {
        match self.store.find_item(&sku).await? {
            Some(mut item) => {
                item.available_quantity = available;
                self.store.commit(vec![item], vec![]).await?;
            }
            None => {
                self.store
                    .upsert_item(InventoryItem::new(sku.clone(), available))
                    .await?;
            }
        }
        self.store
            .find_item(&sku)
            .await?
            .ok_or(InventoryError::ItemNotFound(sku))
    }

    pub async fn get_item(&self, sku: &Sku) -> Result<Option<InventoryItem>> {
        self.store.find_item(sku).await
    }

    pub async fn list_items(&self) -> Result<Vec<InventoryItem>> {
        self.store.list_items().await
    }

    /// Remembers the order's requested lines until the payment outcome
    /// arrives.
    pub async fn cache_order_request(
        &self,
        order_id: OrderId,
        items: Vec<RequestedItem>,
    ) -> Result<()> {
        self.store.put_order_request(order_id, items).await
    }

    pub async fn cached_order_request(
        &self,
        order_id: OrderId,
    ) -> Result<Option<Vec<RequestedItem>>> {
        self.store.get_order_request(order_id).await
    }

    /// Attempts to reserve every requested line for the order.
    ///
    /// All-or-nothing: if any line cannot be covered, nothing is reserved
    /// and every shortfall is reported in one `InventoryInsufficient` event.
    /// A commit conflict is reported the same way; under contention the
    /// saga cancels the order, which is the safe default.
    #[tracing::instrument(skip(self, requested))]
    pub async fn reserve_for_order(
        &self,
        order_id: OrderId,
        requested: &[RequestedItem],
    ) -> Result<ReserveOutcome> {
        // Redelivered after a crash between commit and claim: the holds are
        // already in place.
        let existing = self.store.active_reservations_for_order(order_id).await?;
        if !existing.is_empty() {
            return Ok(ReserveOutcome::Reserved(existing));
        }

        let mut updates: Vec<InventoryItem> = Vec::new();
        let mut reservations: Vec<InventoryReservation> = Vec::new();
        let mut shortfalls: Vec<InsufficientItem> = Vec::new();

        for line in requested {
            match self.store.find_item(&line.sku).await? {
                Some(mut item) if item.can_reserve(line.quantity) => {
                    item.reserve(line.quantity)?;
                    updates.push(item);
                    reservations.push(InventoryReservation::new(
                        order_id,
                        line.sku.clone(),
                        line.quantity,
                        self.reservation_ttl,
                    ));
                }
                Some(item) => shortfalls.push(InsufficientItem {
                    sku: line.sku.clone(),
                    requested: line.quantity,
                    available: item.available_quantity,
                }),
                None => shortfalls.push(InsufficientItem {
                    sku: line.sku.clone(),
                    requested: line.quantity,
                    available: 0,
                }),
            }
        }

        if !shortfalls.is_empty() {
            return self.report_insufficient(order_id, shortfalls).await;
        }

        match self.store.commit(updates, reservations.clone()).await {
            Ok(()) => {
                let reserved_items = reservations
                    .iter()
                    .map(|r| ReservedItem {
                        sku: r.sku.clone(),
                        quantity: r.quantity,
                        reservation_id: r.id,
                    })
                    .collect();
                let event = DomainEvent::inventory_reserved(order_id, reserved_items);
                self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

                metrics::counter!("inventory_reservations_created")
                    .increment(reservations.len() as u64);
                tracing::info!(order_id = %order_id, lines = reservations.len(), "inventory reserved");
                Ok(ReserveOutcome::Reserved(reservations))
            }
            Err(InventoryError::Conflict(sku)) => {
                tracing::warn!(order_id = %order_id, sku = %sku, "reservation commit conflict");
                let mut shortfalls = Vec::new();
                for line in requested {
                    let available = self
                        .store
                        .find_item(&line.sku)
                        .await?
                        .map_or(0, |i| i.available_quantity);
                    shortfalls.push(InsufficientItem {
                        sku: line.sku.clone(),
                        requested: line.quantity,
                        available,
                    });
                }
                self.report_insufficient(order_id, shortfalls).await
            }
            Err(other) => Err(other),
        }
    }

    async fn report_insufficient(
        &self,
        order_id: OrderId,
        shortfalls: Vec<InsufficientItem>,
    ) -> Result<ReserveOutcome> {
        let event = DomainEvent::inventory_insufficient(order_id, shortfalls.clone());
        self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

        metrics::counter!("inventory_reservations_insufficient").increment(1);
        tracing::info!(order_id = %order_id, shortfalls = shortfalls.len(), "insufficient inventory");
        Ok(ReserveOutcome::Insufficient(shortfalls))
    }

    /// Returns every ACTIVE reservation for the order to the pool.
    ///
    /// Returns the released reservations so callers can report exactly what
    /// was acted on. No-op (and no event) when nothing is active.
    #[tracing::instrument(skip(self))]
    pub async fn release_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        self.finish_reservations(order_id, false).await
    }

    /// Finalizes the sale: reserved quantity leaves the system for good.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryReservation>> {
        self.finish_reservations(order_id, true).await
    }

    async fn finish_reservations(
        &self,
        order_id: OrderId,
        confirm: bool,
    ) -> Result<Vec<InventoryReservation>> {
        let mut reservations = self.store.active_reservations_for_order(order_id).await?;
        if reservations.is_empty() {
            return Ok(vec![]);
        }

        // Sum per sku so each item is updated once.
        let mut by_sku: std::collections::BTreeMap<Sku, u32> = std::collections::BTreeMap::new();
        for r in &reservations {
            *by_sku.entry(r.sku.clone()).or_insert(0) += r.quantity;
        }

        let mut updates = Vec::new();
        for (sku, quantity) in by_sku {
            let mut item = self
                .store
                .find_item(&sku)
                .await?
                .ok_or(InventoryError::ItemNotFound(sku))?;
            if confirm {
                item.confirm(quantity)?;
            } else {
                item.release(quantity)?;
            }
            updates.push(item);
        }

        for r in &mut reservations {
            if confirm {
                r.confirm()?;
            } else {
                r.release()?;
            }
        }

        self.store.commit(updates, reservations.clone()).await?;

        if confirm {
            metrics::counter!("inventory_reservations_confirmed")
                .increment(reservations.len() as u64);
            tracing::info!(order_id = %order_id, lines = reservations.len(), "reservations confirmed");
        } else {
            let released_items = reservations
                .iter()
                .map(|r| ReleasedItem {
                    sku: r.sku.clone(),
                    quantity: r.quantity,
                    reservation_id: r.id,
                })
                .collect();
            let event = DomainEvent::inventory_released(order_id, released_items);
            self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

            metrics::counter!("inventory_reservations_released")
                .increment(reservations.len() as u64);
            tracing::info!(order_id = %order_id, lines = reservations.len(), "reservations released");
        }

        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::InMemoryOutboxStore;

    use crate::reservation::ReservationStatus;
    use crate::store::InMemoryInventoryStore;

    type Service = InventoryService<InMemoryInventoryStore, InMemoryOutboxStore>;

    fn setup() -> (Service, InMemoryInventoryStore, InMemoryOutboxStore) {
        let store = InMemoryInventoryStore::new();
        let outbox = InMemoryOutboxStore::new();
        let service = InventoryService::new(store.clone(), outbox.clone());
        (service, store, outbox)
    }

    fn line(sku: &str, quantity: u32) -> RequestedItem {
        RequestedItem {
            sku: Sku::new(sku),
            quantity,
        }
    }

    async fn stock(service: &Service, sku: &str, available: u32) {
        service.set_stock(Sku::new(sku), available).await.unwrap();
    }

    async fn available(service: &Service, sku: &str) -> (u32, u32) {
        let item = service.get_item(&Sku::new(sku)).await.unwrap().unwrap();
        (item.available_quantity, item.reserved_quantity)
    }

    #[tokio::test]
    async fn reserve_moves_stock_and_outboxes_event() {
        let (service, _store, outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        let order_id = OrderId::new();

        let outcome = service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let ReserveOutcome::Reserved(reservations) = outcome else {
            panic!("expected success");
        };
        assert_eq!(reservations.len(), 1);
        assert_eq!(available(&service, "SKU-1").await, (6, 4));

        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "InventoryReserved");
    }

    #[tokio::test]
    async fn all_or_nothing_reports_every_shortfall() {
        let (service, _store, outbox) = setup();
        stock(&service, "A", 20).await;
        stock(&service, "B", 10).await;
        let order_id = OrderId::new();

        let outcome = service
            .reserve_for_order(order_id, &[line("A", 5), line("B", 999999)])
            .await
            .unwrap();

        let ReserveOutcome::Insufficient(shortfalls) = outcome else {
            panic!("expected shortfall");
        };
        assert_eq!(shortfalls.len(), 1);
        assert_eq!(shortfalls[0].sku, Sku::new("B"));
        assert_eq!(shortfalls[0].requested, 999999);
        assert_eq!(shortfalls[0].available, 10);

        // Neither line committed.
        assert_eq!(available(&service, "A").await, (20, 0));
        assert_eq!(available(&service, "B").await, (10, 0));

        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[0].event_type, "InventoryInsufficient");
    }

    #[tokio::test]
    async fn unknown_sku_reports_zero_available() {
        let (service, _store, _outbox) = setup();
        let order_id = OrderId::new();

        let outcome = service
            .reserve_for_order(order_id, &[line("GHOST", 1)])
            .await
            .unwrap();

        let ReserveOutcome::Insufficient(shortfalls) = outcome else {
            panic!("expected shortfall");
        };
        assert_eq!(shortfalls[0].available, 0);
    }

    #[tokio::test]
    async fn commit_conflict_is_reported_as_insufficient() {
        let (service, store, outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        store.fail_next_commits(1).await;
        let order_id = OrderId::new();

        let outcome = service
            .reserve_for_order(order_id, &[line("SKU-1", 2)])
            .await
            .unwrap();

        assert!(matches!(outcome, ReserveOutcome::Insufficient(_)));
        assert_eq!(available(&service, "SKU-1").await, (10, 0));
        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[0].event_type, "InventoryInsufficient");
    }

    #[tokio::test]
    async fn redelivered_reserve_returns_the_existing_holds() {
        let (service, _store, outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        let order_id = OrderId::new();

        service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();
        let outcome = service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let ReserveOutcome::Reserved(reservations) = outcome else {
            panic!("expected success");
        };
        assert_eq!(reservations.len(), 1);
        // No double hold, no second event.
        assert_eq!(available(&service, "SKU-1").await, (6, 4));
        assert_eq!(outbox.fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn release_returns_stock_and_reports_reservations() {
        let (service, _store, outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        let order_id = OrderId::new();
        service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let released = service.release_for_order(order_id).await.unwrap();

        assert_eq!(released.len(), 1);
        assert_eq!(released[0].status, ReservationStatus::Released);
        assert_eq!(available(&service, "SKU-1").await, (10, 0));

        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[1].event_type, "InventoryReleased");
    }

    #[tokio::test]
    async fn release_without_active_reservations_is_a_noop() {
        let (service, _store, outbox) = setup();
        let released = service.release_for_order(OrderId::new()).await.unwrap();
        assert!(released.is_empty());
        assert!(outbox.fetch_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_removes_stock_permanently() {
        let (service, _store, outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        let order_id = OrderId::new();
        service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let confirmed = service.confirm_for_order(order_id).await.unwrap();

        assert_eq!(confirmed[0].status, ReservationStatus::Confirmed);
        assert_eq!(available(&service, "SKU-1").await, (6, 0));

        // Confirm emits no event.
        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "InventoryReserved");
    }

    #[tokio::test]
    async fn multiple_reservations_release_grouped_by_sku() {
        let (service, _store, _outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        stock(&service, "SKU-2", 5).await;
        let order_id = OrderId::new();

        service
            .reserve_for_order(order_id, &[line("SKU-1", 3), line("SKU-2", 2)])
            .await
            .unwrap();
        let released = service.release_for_order(order_id).await.unwrap();

        assert_eq!(released.len(), 2);
        assert_eq!(available(&service, "SKU-1").await, (10, 0));
        assert_eq!(available(&service, "SKU-2").await, (5, 0));
    }

    #[tokio::test]
    async fn set_stock_preserves_reserved_quantity() {
        let (service, _store, _outbox) = setup();
        stock(&service, "SKU-1", 10).await;
        let order_id = OrderId::new();
        service
            .reserve_for_order(order_id, &[line("SKU-1", 4)])
            .await
            .unwrap();

        let item = service.set_stock(Sku::new("SKU-1"), 20).await.unwrap();
        assert_eq!(item.available_quantity, 20);
        assert_eq!(item.reserved_quantity, 4);
    }
}

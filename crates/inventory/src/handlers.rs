//! Inventory-side workflow handler.
//!
//! Reservation happens on `PaymentAuthorized`, not `OrderCreated`: stock is
//! held only for orders whose funds cleared. Because the authorization event
//! carries no line items, the handler caches the requested lines from
//! `OrderCreated` and reads them back when the authorization arrives. The
//! cache read can miss when topics interleave, which is a transient
//! condition, not an error.

use std::sync::Arc;

use async_trait::async_trait;
use events::{DomainEvent, ORDER_EVENTS, PAYMENT_EVENTS};
use messaging::{EventHandler, HandlerError, OutboxStore};

use crate::error::InventoryError;
use crate::service::InventoryService;
use crate::store::{InventoryStore, RequestedItem};

/// Consumer group for the inventory handler.
pub const INVENTORY_CONSUMER: &str = "inventory-consumer";

pub struct InventoryEventHandler<S, O> {
    service: Arc<InventoryService<S, O>>,
}

impl<S, O> InventoryEventHandler<S, O>
where
    S: InventoryStore,
    O: OutboxStore,
{
    pub fn new(service: Arc<InventoryService<S, O>>) -> Self {
        Self { service }
    }
}

fn map_error(err: InventoryError) -> HandlerError {
    match err {
        InventoryError::Conflict(_) | InventoryError::Messaging(_) => {
            HandlerError::Transient(err.to_string())
        }
        InventoryError::OrderRequestMissing(_) => HandlerError::Transient(err.to_string()),
        other => HandlerError::Permanent(other.to_string()),
    }
}

#[async_trait]
impl<S, O> EventHandler for InventoryEventHandler<S, O>
where
    S: InventoryStore,
    O: OutboxStore,
{
    fn consumer_name(&self) -> &str {
        INVENTORY_CONSUMER
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![ORDER_EVENTS, PAYMENT_EVENTS]
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let order_id = event.order_id();
        match event {
            DomainEvent::OrderCreated(data) => {
                let items = data
                    .items
                    .iter()
                    .map(|i| RequestedItem {
                        sku: i.sku.clone(),
                        quantity: i.quantity,
                    })
                    .collect();
                self.service
                    .cache_order_request(order_id, items)
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::PaymentAuthorized(_) => {
                let requested = self
                    .service
                    .cached_order_request(order_id)
                    .await
                    .map_err(map_error)?
                    .ok_or_else(|| map_error(InventoryError::OrderRequestMissing(order_id)))?;
                self.service
                    .reserve_for_order(order_id, &requested)
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::OrderCompleted(_) => {
                self.service
                    .confirm_for_order(order_id)
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::OrderCancelled(_) => {
                self.service
                    .release_for_order(order_id)
                    .await
                    .map_err(map_error)?;
            }
            // Declines and reversals never held stock.
            DomainEvent::PaymentDeclined(_) | DomainEvent::PaymentReversed(_) => {}
            // This service's own emissions, not on subscribed topics.
            DomainEvent::InventoryReserved(_)
            | DomainEvent::InventoryInsufficient(_)
            | DomainEvent::InventoryReleased(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Currency, CustomerId, Money, OrderId, PaymentId, Sku};
    use events::OrderItemData;
    use messaging::InMemoryOutboxStore;

    use crate::store::InMemoryInventoryStore;

    type Service = InventoryService<InMemoryInventoryStore, InMemoryOutboxStore>;

    fn setup() -> (
        Arc<Service>,
        InventoryEventHandler<InMemoryInventoryStore, InMemoryOutboxStore>,
        InMemoryOutboxStore,
    ) {
        let outbox = InMemoryOutboxStore::new();
        let service = Arc::new(InventoryService::new(
            InMemoryInventoryStore::new(),
            outbox.clone(),
        ));
        let handler = InventoryEventHandler::new(service.clone());
        (service, handler, outbox)
    }

    fn created(order_id: OrderId) -> DomainEvent {
        DomainEvent::order_created(
            order_id,
            CustomerId::new("cust-1"),
            vec![OrderItemData {
                sku: Sku::new("SKU-1"),
                quantity: 2,
                unit_price: Money::from_cents(2550),
            }],
            Money::from_cents(5100),
            Currency::usd(),
        )
    }

    fn authorized(order_id: OrderId) -> DomainEvent {
        DomainEvent::payment_authorized(order_id, PaymentId::new(), Money::from_cents(5100))
    }

    #[tokio::test]
    async fn reserves_on_payment_authorized_using_cached_request() {
        let (service, handler, outbox) = setup();
        service.set_stock(Sku::new("SKU-1"), 10).await.unwrap();
        let order_id = OrderId::new();

        handler.handle(&created(order_id)).await.unwrap();
        handler.handle(&authorized(order_id)).await.unwrap();

        let item = service.get_item(&Sku::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.reserved_quantity, 2);

        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[0].event_type, "InventoryReserved");
    }

    #[tokio::test]
    async fn authorization_before_order_created_is_transient() {
        let (_service, handler, _outbox) = setup();

        let result = handler.handle(&authorized(OrderId::new())).await;
        assert!(matches!(result, Err(HandlerError::Transient(_))));
    }

    #[tokio::test]
    async fn order_cancelled_releases_the_holds() {
        let (service, handler, outbox) = setup();
        service.set_stock(Sku::new("SKU-1"), 10).await.unwrap();
        let order_id = OrderId::new();
        handler.handle(&created(order_id)).await.unwrap();
        handler.handle(&authorized(order_id)).await.unwrap();

        handler
            .handle(&DomainEvent::order_cancelled(order_id, "declined"))
            .await
            .unwrap();

        let item = service.get_item(&Sku::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.available_quantity, 10);
        assert_eq!(item.reserved_quantity, 0);

        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[1].event_type, "InventoryReleased");
    }

    #[tokio::test]
    async fn order_completed_confirms_the_holds() {
        let (service, handler, _outbox) = setup();
        service.set_stock(Sku::new("SKU-1"), 10).await.unwrap();
        let order_id = OrderId::new();
        handler.handle(&created(order_id)).await.unwrap();
        handler.handle(&authorized(order_id)).await.unwrap();

        handler
            .handle(&DomainEvent::order_completed(order_id))
            .await
            .unwrap();

        let item = service.get_item(&Sku::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.available_quantity, 8);
        assert_eq!(item.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn cancel_without_reservations_is_a_noop() {
        let (_service, handler, outbox) = setup();

        handler
            .handle(&DomainEvent::order_cancelled(OrderId::new(), "declined"))
            .await
            .unwrap();

        assert!(outbox.fetch_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insufficient_stock_reports_shortfall() {
        let (service, handler, outbox) = setup();
        service.set_stock(Sku::new("SKU-1"), 1).await.unwrap();
        let order_id = OrderId::new();

        handler.handle(&created(order_id)).await.unwrap();
        handler.handle(&authorized(order_id)).await.unwrap();

        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[0].event_type, "InventoryInsufficient");
        let item = service.get_item(&Sku::new("SKU-1")).await.unwrap().unwrap();
        assert_eq!(item.reserved_quantity, 0);
    }
}

//! Saga handler: drives the order state machine from payment and inventory
//! outcomes.
//!
//! Every branch is guarded on the order's current status. An event arriving
//! for an order in a different status is a duplicate or a stale delivery and
//! leaves the aggregate untouched. An event arriving before its order is
//! visible is transient: cross-topic ordering is not guaranteed, so the
//! delivery is retried rather than rejected.

use std::sync::Arc;

use async_trait::async_trait;
use events::{DomainEvent, InsufficientItem};
use messaging::{EventHandler, HandlerError, OutboxStore};
use events::{INVENTORY_EVENTS, PAYMENT_EVENTS};

use crate::error::OrderError;
use crate::order::OrderStatus;
use crate::service::OrderService;
use crate::store::OrderStore;

/// Consumer group for the saga handler.
pub const SAGA_CONSUMER: &str = "orders-saga";

pub struct OrderSagaHandler<S, O> {
    service: Arc<OrderService<S, O>>,
}

impl<S, O> OrderSagaHandler<S, O>
where
    S: OrderStore,
    O: OutboxStore,
{
    pub fn new(service: Arc<OrderService<S, O>>) -> Self {
        Self { service }
    }

    fn shortfall_reason(items: &[InsufficientItem]) -> String {
        let detail: Vec<String> = items
            .iter()
            .map(|i| format!("{} requested {} available {}", i.sku, i.requested, i.available))
            .collect();
        format!("insufficient inventory: {}", detail.join(", "))
    }
}

fn map_error(err: OrderError) -> HandlerError {
    match err {
        // The order may not be visible to this consumer yet.
        OrderError::NotFound(_) => HandlerError::Transient(err.to_string()),
        // Another writer won; redo the whole unit of work on redelivery.
        OrderError::Conflict { .. } => HandlerError::Transient(err.to_string()),
        other => HandlerError::Permanent(other.to_string()),
    }
}

#[async_trait]
impl<S, O> EventHandler for OrderSagaHandler<S, O>
where
    S: OrderStore,
    O: OutboxStore,
{
    fn consumer_name(&self) -> &str {
        SAGA_CONSUMER
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![PAYMENT_EVENTS, INVENTORY_EVENTS]
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let order_id = event.order_id();
        let order = self
            .service
            .get_order(order_id)
            .await
            .map_err(map_error)?
            .ok_or_else(|| {
                HandlerError::Transient(format!("order {order_id} not visible yet"))
            })?;

        match event {
            DomainEvent::PaymentAuthorized(_) => {
                if order.status != OrderStatus::PaymentPending {
                    return Ok(());
                }
                self.service
                    .mark_inventory_pending(order_id)
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::PaymentDeclined(data) => {
                if order.status != OrderStatus::PaymentPending {
                    return Ok(());
                }
                self.service
                    .cancel_order(order_id, &format!("payment declined: {}", data.reason))
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::InventoryReserved(_) => {
                if order.status != OrderStatus::InventoryPending {
                    return Ok(());
                }
                self.service
                    .complete_order(order_id)
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::InventoryInsufficient(data) => {
                if order.status != OrderStatus::InventoryPending {
                    return Ok(());
                }
                self.service
                    .cancel_order(order_id, &Self::shortfall_reason(&data.insufficient_items))
                    .await
                    .map_err(map_error)?;
            }
            // Compensation confirmations; the order is already terminal.
            DomainEvent::PaymentReversed(_) | DomainEvent::InventoryReleased(_) => {}
            // This service's own emissions, not on subscribed topics.
            DomainEvent::OrderCreated(_)
            | DomainEvent::OrderCompleted(_)
            | DomainEvent::OrderCancelled(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Currency, CustomerId, Money, OrderId, PaymentId, Sku};
    use messaging::InMemoryOutboxStore;

    use crate::order::OrderItem;
    use crate::store::InMemoryOrderStore;

    type Service = OrderService<InMemoryOrderStore, InMemoryOutboxStore>;

    fn setup() -> (Arc<Service>, OrderSagaHandler<InMemoryOrderStore, InMemoryOutboxStore>) {
        let service = Arc::new(OrderService::new(
            InMemoryOrderStore::new(),
            InMemoryOutboxStore::new(),
        ));
        let handler = OrderSagaHandler::new(service.clone());
        (service, handler)
    }

    async fn create_order(service: &Service) -> OrderId {
        service
            .create_order(
                CustomerId::new("cust-1"),
                vec![OrderItem {
                    sku: Sku::new("SKU-1"),
                    quantity: 1,
                    unit_price: Money::from_cents(1000),
                }],
                Currency::usd(),
            )
            .await
            .unwrap()
            .id
    }

    fn authorized(order_id: OrderId) -> DomainEvent {
        DomainEvent::payment_authorized(order_id, PaymentId::new(), Money::from_cents(1000))
    }

    #[tokio::test]
    async fn payment_authorized_advances_order() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;

        handler.handle(&authorized(order_id)).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::InventoryPending);
    }

    #[tokio::test]
    async fn duplicate_payment_authorized_is_a_noop() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;

        handler.handle(&authorized(order_id)).await.unwrap();
        handler.handle(&authorized(order_id)).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::InventoryPending);
    }

    #[tokio::test]
    async fn payment_declined_cancels_order() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;

        let event = DomainEvent::payment_declined(
            order_id,
            PaymentId::new(),
            "amount exceeds limit",
            Money::from_cents(1000),
        );
        handler.handle(&event).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn inventory_reserved_completes_order() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;
        handler.handle(&authorized(order_id)).await.unwrap();

        let event = DomainEvent::inventory_reserved(order_id, vec![]);
        handler.handle(&event).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn inventory_insufficient_cancels_with_shortfall_reason() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;
        handler.handle(&authorized(order_id)).await.unwrap();

        let event = DomainEvent::inventory_insufficient(
            order_id,
            vec![InsufficientItem {
                sku: Sku::new("SKU-2"),
                requested: 1,
                available: 0,
            }],
        );
        handler.handle(&event).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn event_for_unknown_order_is_transient() {
        let (_service, handler) = setup();

        let result = handler.handle(&authorized(OrderId::new())).await;
        assert!(matches!(result, Err(HandlerError::Transient(_))));
    }

    #[tokio::test]
    async fn stale_inventory_event_does_not_revive_cancelled_order() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;
        handler.handle(&authorized(order_id)).await.unwrap();
        service.cancel_order(order_id, "operator cancel").await.unwrap();

        let event = DomainEvent::inventory_reserved(order_id, vec![]);
        handler.handle(&event).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn compensation_confirmations_leave_order_untouched() {
        let (service, handler) = setup();
        let order_id = create_order(&service).await;
        handler.handle(&authorized(order_id)).await.unwrap();
        service.cancel_order(order_id, "operator cancel").await.unwrap();

        let reversed =
            DomainEvent::payment_reversed(order_id, PaymentId::new(), Money::from_cents(1000));
        handler.handle(&reversed).await.unwrap();
        let released = DomainEvent::inventory_released(order_id, vec![]);
        handler.handle(&released).await.unwrap();

        let order = service.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }
}

//! Order service: creation and saga-driven lifecycle changes.
//!
//! Every mutation writes the aggregate and its outgoing event in the same
//! unit of work. Events never leave from in-memory state; the relay picks
//! them up from the outbox.

use common::{Currency, CustomerId, Money, OrderId};
use events::{DomainEvent, OrderItemData};
use messaging::{OutboxRecord, OutboxStore};

use crate::error::{OrderError, Result};
use crate::order::{Order, OrderItem, OrderStatus};
use crate::store::OrderStore;

pub struct OrderService<S, O> {
    store: S,
    outbox: O,
}

impl<S, O> OrderService<S, O>
where
    S: OrderStore,
    O: OutboxStore,
{
    pub fn new(store: S, outbox: O) -> Self {
        Self { store, outbox }
    }

    /// Creates an order and kicks off the workflow.
    ///
    /// The order is persisted in `Pending`, `OrderCreated` is outboxed, and
    /// the order immediately advances to `PaymentPending` to await the
    /// authorization outcome.
    #[tracing::instrument(skip(self, items), fields(customer_id = %customer_id))]
    pub async fn create_order(
        &self,
        customer_id: CustomerId,
        items: Vec<OrderItem>,
        currency: Currency,
    ) -> Result<Order> {
        let mut order = Order::new(customer_id, items, currency)?;
        self.store.insert(order.clone()).await?;

        let event = DomainEvent::order_created(
            order.id,
            order.customer_id.clone(),
            order
                .items
                .iter()
                .map(|i| OrderItemData {
                    sku: i.sku.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            order.total_amount,
            order.currency.clone(),
        );
        self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

        order.transition_to(OrderStatus::PaymentPending)?;
        let order = self.store.update(&order).await?;

        metrics::counter!("orders_created").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Advances a `PaymentPending` order after its payment was authorized.
    #[tracing::instrument(skip(self))]
    pub async fn mark_inventory_pending(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.require(order_id).await?;
        order.transition_to(OrderStatus::InventoryPending)?;
        self.store.update(&order).await
    }

    /// Completes an `InventoryPending` order and outboxes `OrderCompleted`.
    #[tracing::instrument(skip(self))]
    pub async fn complete_order(&self, order_id: OrderId) -> Result<Order> {
        let mut order = self.require(order_id).await?;
        order.transition_to(OrderStatus::Completed)?;
        let order = self.store.update(&order).await?;

        let event = DomainEvent::order_completed(order.id);
        self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

        metrics::counter!("orders_completed").increment(1);
        tracing::info!(order_id = %order.id, "order completed");
        Ok(order)
    }

    /// Cancels an order and outboxes `OrderCancelled`.
    ///
    /// The cancel event is the compensation trigger: inventory releases its
    /// reservations and payments reverses any authorized payment when they
    /// consume it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let mut order = self.require(order_id).await?;
        order.transition_to(OrderStatus::Cancelled)?;
        let order = self.store.update(&order).await?;

        let event = DomainEvent::order_cancelled(order.id, reason);
        self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

        metrics::counter!("orders_cancelled").increment(1);
        tracing::info!(order_id = %order.id, reason, "order cancelled");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.store.find(order_id).await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        self.store.list().await
    }

    /// Returns the current total for an order, used by the payment handler.
    pub async fn order_total(&self, order_id: OrderId) -> Result<Option<Money>> {
        Ok(self.store.find(order_id).await?.map(|o| o.total_amount))
    }

    async fn require(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .find(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }
}

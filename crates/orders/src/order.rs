//! Order aggregate and its lifecycle state machine.

use chrono::{DateTime, Utc};
use common::{Currency, CustomerId, Money, OrderId, Sku};
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// The status of an order in its lifecycle.
///
/// Legal transitions:
/// ```text
/// Pending ──► PaymentPending ──► InventoryPending ──► Completed
///    │              │                    │
///    └──────────────┴────────────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order persisted, `OrderCreated` not yet acted on.
    #[default]
    Pending,

    /// Awaiting the payment authorization outcome.
    PaymentPending,

    /// Payment authorized, awaiting the inventory reservation outcome.
    InventoryPending,

    /// Reservation confirmed, order fulfilled (terminal).
    Completed,

    /// Order was cancelled, compensations triggered (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, PaymentPending)
                | (Pending, Cancelled)
                | (PaymentPending, InventoryPending)
                | (PaymentPending, Cancelled)
                | (InventoryPending, Completed)
                | (InventoryPending, Cancelled)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PaymentPending => "PAYMENT_PENDING",
            OrderStatus::InventoryPending => "INVENTORY_PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: Sku,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the line total (`unit_price * quantity`).
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// The order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub currency: Currency,
    /// Optimistic lock, bumped by the store on every update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order in `Pending` status.
    ///
    /// The total is derived from the items, never trusted from the caller.
    pub fn new(customer_id: CustomerId, items: Vec<OrderItem>, currency: Currency) -> Result<Self> {
        if items.is_empty() {
            return Err(OrderError::Validation("order has no items".to_string()));
        }
        if let Some(bad) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::Validation(format!(
                "zero quantity for sku {}",
                bad.sku
            )));
        }

        let total_amount = items.iter().map(OrderItem::line_total).sum();
        let now = Utc::now();

        Ok(Self {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Pending,
            items,
            total_amount,
            currency,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order to `next`, failing on an illegal edge.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<OrderItem> {
        vec![
            OrderItem {
                sku: Sku::new("SKU-1"),
                quantity: 2,
                unit_price: Money::from_cents(2550),
            },
            OrderItem {
                sku: Sku::new("SKU-2"),
                quantity: 1,
                unit_price: Money::from_cents(10000),
            },
        ]
    }

    fn order() -> Order {
        Order::new(CustomerId::new("cust-1"), items(), Currency::usd()).unwrap()
    }

    #[test]
    fn test_new_order_derives_total() {
        let order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_cents(15100));
        assert_eq!(order.version, 1);
    }

    #[test]
    fn test_new_order_rejects_empty_items() {
        let result = Order::new(CustomerId::new("cust-1"), vec![], Currency::usd());
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_new_order_rejects_zero_quantity() {
        let bad = vec![OrderItem {
            sku: Sku::new("SKU-1"),
            quantity: 0,
            unit_price: Money::from_cents(100),
        }];
        let result = Order::new(CustomerId::new("cust-1"), bad, Currency::usd());
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut order = order();
        order.transition_to(OrderStatus::PaymentPending).unwrap();
        order.transition_to(OrderStatus::InventoryPending).unwrap();
        order.transition_to(OrderStatus::Completed).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn test_cancel_from_every_non_terminal_status() {
        for setup in [
            vec![],
            vec![OrderStatus::PaymentPending],
            vec![OrderStatus::PaymentPending, OrderStatus::InventoryPending],
        ] {
            let mut order = order();
            for status in setup {
                order.transition_to(status).unwrap();
            }
            order.transition_to(OrderStatus::Cancelled).unwrap();
            assert_eq!(order.status, OrderStatus::Cancelled);
        }
    }

    #[test]
    fn test_cannot_skip_payment_pending() {
        let mut order = order();
        let result = order.transition_to(OrderStatus::InventoryPending);
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::InventoryPending,
            })
        ));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_statuses_have_no_outgoing_edges() {
        for terminal in [OrderStatus::Completed, OrderStatus::Cancelled] {
            for next in [
                OrderStatus::Pending,
                OrderStatus::PaymentPending,
                OrderStatus::InventoryPending,
                OrderStatus::Completed,
                OrderStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OrderStatus::PaymentPending).unwrap();
        assert_eq!(json, "\"PAYMENT_PENDING\"");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(OrderStatus::InventoryPending.to_string(), "INVENTORY_PENDING");
    }
}

//! Static event-type to topic routing.

use crate::DomainEvent;

/// Topic for order lifecycle events.
pub const ORDER_EVENTS: &str = "order-events";

/// Topic for payment lifecycle events.
pub const PAYMENT_EVENTS: &str = "payment-events";

/// Topic for inventory reservation events.
pub const INVENTORY_EVENTS: &str = "inventory-events";

/// Every domain topic, in replay order.
pub const ALL_TOPICS: &[&str] = &[ORDER_EVENTS, PAYMENT_EVENTS, INVENTORY_EVENTS];

/// Routes an event type to its topic.
///
/// The table is static: the relay looks up the topic from the persisted
/// `event_type` column without deserializing the payload.
pub fn topic_for(event_type: &str) -> &'static str {
    match event_type {
        "OrderCreated" | "OrderCompleted" | "OrderCancelled" => ORDER_EVENTS,
        "PaymentAuthorized" | "PaymentDeclined" | "PaymentReversed" => PAYMENT_EVENTS,
        "InventoryReserved" | "InventoryInsufficient" | "InventoryReleased" => INVENTORY_EVENTS,
        _ => "domain-events",
    }
}

impl DomainEvent {
    /// Returns the topic this event is published to.
    pub fn topic(&self) -> &'static str {
        topic_for(self.event_type())
    }
}

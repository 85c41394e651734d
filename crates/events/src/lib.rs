//! Domain events shared by the orders, inventory, and payments services.
//!
//! The event set is a closed tagged union ([`DomainEvent`]) keyed by its
//! `eventType` tag. Adding an event type is a compile-time-checked change:
//! the serde tag, the topic routing table, and every consumer match on the
//! same enum.

pub mod event;
pub mod topics;

pub use event::{
    DomainEvent, EventMeta, InsufficientItem, InventoryInsufficientData, InventoryReleasedData,
    InventoryReservedData, OrderCancelledData, OrderCompletedData, OrderCreatedData,
    OrderItemData, PaymentAuthorizedData, PaymentDeclinedData, PaymentReversedData, ReleasedItem,
    ReservedItem,
};
pub use topics::{ALL_TOPICS, INVENTORY_EVENTS, ORDER_EVENTS, PAYMENT_EVENTS, topic_for};

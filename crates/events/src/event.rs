//! The domain event sum type and its payload structs.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, PaymentId, ReservationId, Sku};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope metadata carried by every event.
///
/// Flattened into the payload on the wire, so the JSON shape is
/// `{ "eventType": ..., "eventId": ..., "timestamp": ..., "version": "1.0", ...payload }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Unique identifier for this event instance.
    #[serde(rename = "eventId", default = "Uuid::new_v4")]
    pub event_id: Uuid,

    /// When the event was created.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Schema version of the payload.
    #[serde(default = "EventMeta::default_version")]
    pub version: String,
}

impl EventMeta {
    fn default_version() -> String {
        "1.0".to_string()
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version: Self::default_version(),
        }
    }
}

/// One line of an order as carried on `OrderCreated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemData {
    pub sku: Sku,
    pub quantity: u32,
    #[serde(rename = "unitPrice")]
    pub unit_price: Money,
}

/// Payload for `OrderCreated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "customerId")]
    pub customer_id: CustomerId,
    pub items: Vec<OrderItemData>,
    #[serde(rename = "totalAmount")]
    pub total_amount: Money,
    pub currency: common::Currency,
}

/// Payload for `OrderCompleted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
}

/// Payload for `OrderCancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    pub reason: String,
}

/// Payload for `PaymentAuthorized`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorizedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "paymentId")]
    pub payment_id: PaymentId,
    #[serde(rename = "authorizedAmount")]
    pub authorized_amount: Money,
    pub currency: common::Currency,
}

/// Payload for `PaymentDeclined`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeclinedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "paymentId")]
    pub payment_id: PaymentId,
    pub reason: String,
    #[serde(rename = "declinedAmount")]
    pub declined_amount: Money,
}

/// Payload for `PaymentReversed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReversedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "paymentId")]
    pub payment_id: PaymentId,
    #[serde(rename = "reversedAmount")]
    pub reversed_amount: Money,
}

/// One reserved line as carried on `InventoryReserved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedItem {
    pub sku: Sku,
    pub quantity: u32,
    #[serde(rename = "reservationId")]
    pub reservation_id: ReservationId,
}

/// Payload for `InventoryReserved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "reservedItems")]
    pub reserved_items: Vec<ReservedItem>,
}

/// One shortfall as carried on `InventoryInsufficient`:
/// what was requested versus what was actually available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsufficientItem {
    pub sku: Sku,
    pub requested: u32,
    pub available: u32,
}

/// Payload for `InventoryInsufficient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryInsufficientData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "insufficientItems")]
    pub insufficient_items: Vec<InsufficientItem>,
}

/// One released line as carried on `InventoryReleased`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasedItem {
    pub sku: Sku,
    pub quantity: u32,
    #[serde(rename = "reservationId")]
    pub reservation_id: ReservationId,
}

/// Payload for `InventoryReleased`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReleasedData {
    #[serde(flatten)]
    pub meta: EventMeta,
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
    #[serde(rename = "releasedItems")]
    pub released_items: Vec<ReleasedItem>,
}

/// Every event the three services exchange.
///
/// Internally tagged on `eventType` so the wire format is a flat JSON
/// object. Consumers decode through [`DomainEvent::decode`], which skips
/// event types it does not recognize instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum DomainEvent {
    OrderCreated(OrderCreatedData),
    OrderCompleted(OrderCompletedData),
    OrderCancelled(OrderCancelledData),
    PaymentAuthorized(PaymentAuthorizedData),
    PaymentDeclined(PaymentDeclinedData),
    PaymentReversed(PaymentReversedData),
    InventoryReserved(InventoryReservedData),
    InventoryInsufficient(InventoryInsufficientData),
    InventoryReleased(InventoryReleasedData),
}

impl DomainEvent {
    /// Returns the `eventType` tag for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated(_) => "OrderCreated",
            DomainEvent::OrderCompleted(_) => "OrderCompleted",
            DomainEvent::OrderCancelled(_) => "OrderCancelled",
            DomainEvent::PaymentAuthorized(_) => "PaymentAuthorized",
            DomainEvent::PaymentDeclined(_) => "PaymentDeclined",
            DomainEvent::PaymentReversed(_) => "PaymentReversed",
            DomainEvent::InventoryReserved(_) => "InventoryReserved",
            DomainEvent::InventoryInsufficient(_) => "InventoryInsufficient",
            DomainEvent::InventoryReleased(_) => "InventoryReleased",
        }
    }

    /// Returns the order this event belongs to.
    ///
    /// Every event in the workflow is keyed by its order, which is also the
    /// publish partition key.
    pub fn order_id(&self) -> OrderId {
        match self {
            DomainEvent::OrderCreated(d) => d.order_id,
            DomainEvent::OrderCompleted(d) => d.order_id,
            DomainEvent::OrderCancelled(d) => d.order_id,
            DomainEvent::PaymentAuthorized(d) => d.order_id,
            DomainEvent::PaymentDeclined(d) => d.order_id,
            DomainEvent::PaymentReversed(d) => d.order_id,
            DomainEvent::InventoryReserved(d) => d.order_id,
            DomainEvent::InventoryInsufficient(d) => d.order_id,
            DomainEvent::InventoryReleased(d) => d.order_id,
        }
    }

    /// Returns the envelope metadata for this event.
    pub fn meta(&self) -> &EventMeta {
        match self {
            DomainEvent::OrderCreated(d) => &d.meta,
            DomainEvent::OrderCompleted(d) => &d.meta,
            DomainEvent::OrderCancelled(d) => &d.meta,
            DomainEvent::PaymentAuthorized(d) => &d.meta,
            DomainEvent::PaymentDeclined(d) => &d.meta,
            DomainEvent::PaymentReversed(d) => &d.meta,
            DomainEvent::InventoryReserved(d) => &d.meta,
            DomainEvent::InventoryInsufficient(d) => &d.meta,
            DomainEvent::InventoryReleased(d) => &d.meta,
        }
    }

    /// Decodes an event from its wire payload.
    ///
    /// Returns `Ok(None)` when the payload carries an `eventType` this
    /// consumer does not recognize; shared topics are allowed to carry
    /// event types a given consumer ignores.
    pub fn decode(payload: &serde_json::Value) -> Result<Option<DomainEvent>, serde_json::Error> {
        let Some(tag) = payload.get("eventType").and_then(|t| t.as_str()) else {
            return Ok(None);
        };
        if !Self::is_known_type(tag) {
            return Ok(None);
        }
        serde_json::from_value(payload.clone()).map(Some)
    }

    fn is_known_type(tag: &str) -> bool {
        matches!(
            tag,
            "OrderCreated"
                | "OrderCompleted"
                | "OrderCancelled"
                | "PaymentAuthorized"
                | "PaymentDeclined"
                | "PaymentReversed"
                | "InventoryReserved"
                | "InventoryInsufficient"
                | "InventoryReleased"
        )
    }
}

// Convenience constructors.
impl DomainEvent {
    /// Creates an `OrderCreated` event.
    pub fn order_created(
        order_id: OrderId,
        customer_id: CustomerId,
        items: Vec<OrderItemData>,
        total_amount: Money,
        currency: common::Currency,
    ) -> Self {
        DomainEvent::OrderCreated(OrderCreatedData {
            meta: EventMeta::default(),
            order_id,
            customer_id,
            items,
            total_amount,
            currency,
        })
    }

    /// Creates an `OrderCompleted` event.
    pub fn order_completed(order_id: OrderId) -> Self {
        DomainEvent::OrderCompleted(OrderCompletedData {
            meta: EventMeta::default(),
            order_id,
        })
    }

    /// Creates an `OrderCancelled` event.
    pub fn order_cancelled(order_id: OrderId, reason: impl Into<String>) -> Self {
        DomainEvent::OrderCancelled(OrderCancelledData {
            meta: EventMeta::default(),
            order_id,
            reason: reason.into(),
        })
    }

    /// Creates a `PaymentAuthorized` event.
    pub fn payment_authorized(order_id: OrderId, payment_id: PaymentId, amount: Money) -> Self {
        DomainEvent::PaymentAuthorized(PaymentAuthorizedData {
            meta: EventMeta::default(),
            order_id,
            payment_id,
            authorized_amount: amount,
            currency: common::Currency::usd(),
        })
    }

    /// Creates a `PaymentDeclined` event.
    pub fn payment_declined(
        order_id: OrderId,
        payment_id: PaymentId,
        reason: impl Into<String>,
        amount: Money,
    ) -> Self {
        DomainEvent::PaymentDeclined(PaymentDeclinedData {
            meta: EventMeta::default(),
            order_id,
            payment_id,
            reason: reason.into(),
            declined_amount: amount,
        })
    }

    /// Creates a `PaymentReversed` event.
    pub fn payment_reversed(order_id: OrderId, payment_id: PaymentId, amount: Money) -> Self {
        DomainEvent::PaymentReversed(PaymentReversedData {
            meta: EventMeta::default(),
            order_id,
            payment_id,
            reversed_amount: amount,
        })
    }

    /// Creates an `InventoryReserved` event.
    pub fn inventory_reserved(order_id: OrderId, reserved_items: Vec<ReservedItem>) -> Self {
        DomainEvent::InventoryReserved(InventoryReservedData {
            meta: EventMeta::default(),
            order_id,
            reserved_items,
        })
    }

    /// Creates an `InventoryInsufficient` event.
    pub fn inventory_insufficient(
        order_id: OrderId,
        insufficient_items: Vec<InsufficientItem>,
    ) -> Self {
        DomainEvent::InventoryInsufficient(InventoryInsufficientData {
            meta: EventMeta::default(),
            order_id,
            insufficient_items,
        })
    }

    /// Creates an `InventoryReleased` event.
    pub fn inventory_released(order_id: OrderId, released_items: Vec<ReleasedItem>) -> Self {
        DomainEvent::InventoryReleased(InventoryReleasedData {
            meta: EventMeta::default(),
            order_id,
            released_items,
        })
    }
}

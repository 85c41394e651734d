use common::{OrderId, ReservationId, Sku};
use thiserror::Error;

/// Errors from the inventory service.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// No item with the given SKU.
    #[error("inventory item not found: {0}")]
    ItemNotFound(Sku),

    /// Quantity math would violate an item invariant.
    #[error("invalid quantity for sku {sku}: {message}")]
    InvalidQuantity { sku: Sku, message: String },

    /// The reservation is not in a state allowing the requested change.
    #[error("reservation {0} is not active")]
    ReservationNotActive(ReservationId),

    /// Optimistic version check failed during an atomic commit. Nothing
    /// was applied.
    #[error("concurrent modification of sku {0}")]
    Conflict(Sku),

    /// No cached order request for the order; the `OrderCreated` event has
    /// not been observed yet.
    #[error("no order request cached for order {0}")]
    OrderRequestMissing(OrderId),

    #[error("messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InventoryError>;

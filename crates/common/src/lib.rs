//! Shared types for the order-fulfillment services.
//!
//! Every service crate depends on these newtypes so that an order ID can
//! never be passed where a payment ID is expected, and money amounts are
//! always integer cents.

pub mod money;
pub mod types;

pub use money::{Currency, Money};
pub use types::{CustomerId, OrderId, PaymentId, ReservationId, Sku};

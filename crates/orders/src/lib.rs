//! The orders service: aggregate, saga handler, and read model.
//!
//! The order is the saga root. Creation outboxes `OrderCreated`; every later
//! transition is driven by payment and inventory outcomes consumed from the
//! broker. Cancellation is the compensation trigger for the other services.

pub mod error;
pub mod handlers;
pub mod order;
pub mod read_model;
pub mod service;
pub mod store;

pub use error::{OrderError, Result};
pub use handlers::{OrderSagaHandler, SAGA_CONSUMER};
pub use order::{Order, OrderItem, OrderStatus};
pub use read_model::{OrderProjector, OrderSummary, OrderSummaryStore, PROJECTOR_CONSUMER};
pub use service::OrderService;
pub use store::{InMemoryOrderStore, OrderStore};

//! The payments service: authorization, decline, and reversal.

pub mod error;
pub mod gateway;
pub mod handlers;
pub mod payment;
pub mod service;
pub mod store;

pub use error::{PaymentError, Result};
pub use gateway::{
    AUTHORIZATION_LIMIT_CENTS, DeterministicGateway, GatewayDecision, PaymentGateway,
};
pub use handlers::{PAYMENTS_CONSUMER, PaymentEventHandler};
pub use payment::{Payment, PaymentStatus};
pub use service::PaymentService;
pub use store::{InMemoryPaymentStore, PaymentStore};

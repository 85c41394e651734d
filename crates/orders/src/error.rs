use common::OrderId;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors from the orders service.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status change is not an edge in the lifecycle graph.
    #[error("invalid order transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// No order with the given ID.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// Optimistic version check failed. The unit of work was abandoned;
    /// the caller decides whether to retry.
    #[error("concurrent modification of order {order_id}: expected version {expected}")]
    Conflict { order_id: OrderId, expected: i64 },

    /// The create request failed validation.
    #[error("invalid order request: {0}")]
    Validation(String),

    #[error("messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrderError>;

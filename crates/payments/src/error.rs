use common::PaymentId;
use thiserror::Error;

use crate::payment::PaymentStatus;

/// Errors from the payments service.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// No payment with the given ID.
    #[error("payment not found: {0}")]
    NotFound(PaymentId),

    /// The requested status change is not a legal lifecycle edge.
    #[error("invalid payment transition from {from} to {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Optimistic version check failed; the unit of work was abandoned.
    #[error("concurrent modification of payment {0}")]
    Conflict(PaymentId),

    #[error("messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

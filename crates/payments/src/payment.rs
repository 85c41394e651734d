//! Payment aggregate and its lifecycle.

use chrono::{DateTime, Utc};
use common::{Currency, Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// The status of a payment.
///
/// Legal transitions: `Pending → Authorized | Declined`,
/// `Authorized → Reversed`. `Declined` and `Reversed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Authorized,
    Declined,
    Reversed,
}

impl PaymentStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Authorized) | (Pending, Declined) | (Authorized, Reversed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Declined | PaymentStatus::Reversed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Declined => "DECLINED",
            PaymentStatus::Reversed => "REVERSED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payment aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: Currency,
    pub status: PaymentStatus,
    /// Optimistic lock, bumped by the store on every update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a new payment in `Pending`.
    pub fn new(order_id: OrderId, amount: Money, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            order_id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the payment to `next`, failing on an illegal edge.
    pub fn transition_to(&mut self, next: PaymentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

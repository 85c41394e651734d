//! Authorization gateway seam.
//!
//! Production would call an external processor; the shipped implementation
//! is deterministic so the workflow's behavior is reproducible in tests.

use common::{Currency, Money, OrderId};

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    Approved,
    Declined(String),
}

/// Authorization decision point.
pub trait PaymentGateway: Send + Sync {
    fn authorize(&self, order_id: OrderId, amount: Money, currency: &Currency) -> GatewayDecision;
}

/// Largest amount the simulated gateway approves, in cents ($10,000).
pub const AUTHORIZATION_LIMIT_CENTS: i64 = 1_000_000;

/// Deterministic gateway: declines non-positive amounts and amounts over
/// the authorization limit, approves everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicGateway;

impl PaymentGateway for DeterministicGateway {
    fn authorize(&self, _order_id: OrderId, amount: Money, _currency: &Currency) -> GatewayDecision {
        if !amount.is_positive() {
            return GatewayDecision::Declined("invalid amount".to_string());
        }
        if amount.cents() > AUTHORIZATION_LIMIT_CENTS {
            return GatewayDecision::Declined("amount exceeds limit".to_string());
        }
        GatewayDecision::Approved
    }
}

//! Per-order stock reservations with a TTL.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ReservationId, Sku};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};

/// Default time a reservation holds stock before the reaper reclaims it.
pub const DEFAULT_RESERVATION_TTL_MINUTES: i64 = 15;

/// The status of a reservation.
///
/// `Active` is the only non-terminal state. An `Active` reservation past its
/// `expires_at` is a defect until the reaper releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Released,
    Confirmed,
}

/// A hold of `quantity` units of one SKU for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub sku: Sku,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl InventoryReservation {
    /// Creates an active reservation expiring after `ttl`.
    pub fn new(order_id: OrderId, sku: Sku, quantity: u32, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            order_id,
            sku,
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns true if the reservation is past its TTL and still active.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at < now
    }

    /// Returns the stock to the pool.
    pub fn release(&mut self) -> Result<()> {
        self.transition(ReservationStatus::Released)
    }

    /// Finalizes the sale.
    pub fn confirm(&mut self) -> Result<()> {
        self.transition(ReservationStatus::Confirmed)
    }

    fn transition(&mut self, next: ReservationStatus) -> Result<()> {
        if self.status != ReservationStatus::Active {
            return Err(InventoryError::ReservationNotActive(self.id));
        }
        self.status = next;
        Ok(())
    }
}

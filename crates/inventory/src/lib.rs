//! The inventory service: stock levels, reservations, and the expiry reaper.
//!
//! Reservations are all-or-nothing per order and carry a TTL; the reaper
//! reclaims holds whose order never reached a terminal state.

pub mod error;
pub mod handlers;
pub mod item;
pub mod reaper;
pub mod reservation;
pub mod service;
pub mod store;

pub use error::{InventoryError, Result};
pub use handlers::{INVENTORY_CONSUMER, InventoryEventHandler};
pub use item::InventoryItem;
pub use reaper::{DEFAULT_SCAN_INTERVAL, ExpiryReaper};
pub use reservation::{
    DEFAULT_RESERVATION_TTL_MINUTES, InventoryReservation, ReservationStatus,
};
pub use service::{InventoryService, ReserveOutcome};
pub use store::{InMemoryInventoryStore, InventoryStore, RequestedItem};

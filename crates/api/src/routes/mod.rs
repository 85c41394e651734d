//! HTTP route handlers.

pub mod admin;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;

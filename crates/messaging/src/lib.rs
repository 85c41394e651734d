//! Reliability layer for cross-service eventing.
//!
//! This crate provides the primitives that make the order workflow correct
//! under partial failure:
//! - [`OutboxStore`] / [`OutboxRelay`]: events are written to a local outbox
//!   table in the same unit of work as the aggregate change, then relayed to
//!   the broker asynchronously (the transactional outbox pattern)
//! - [`IdempotencyStore`] / [`IdempotentConsumer`]: conditional-insert claims
//!   that collapse duplicate deliveries into a single processing pass
//! - [`Broker`]: the minimal publish/poll contract the services need, with an
//!   in-memory implementation for tests and local runs
//! - [`EventConsumer`]: the polling loop gluing broker deliveries through
//!   dedup into an [`EventHandler`]

pub mod broker;
pub mod consumer;
pub mod error;
pub mod idempotency;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod relay;

pub use broker::{Broker, Delivery};
pub use consumer::{ConsumerConfig, EventConsumer, EventHandler, HandlerError};
pub use error::{MessagingError, Result};
pub use idempotency::{IdempotencyRecord, IdempotencyStore, IdempotentConsumer, dedup_key};
pub use memory::{InMemoryBroker, InMemoryIdempotencyStore, InMemoryOutboxStore};
pub use outbox::{OutboxRecord, OutboxStatus, OutboxStore};
pub use postgres::{PgIdempotencyStore, PgOutboxStore};
pub use relay::{OutboxRelay, RelayConfig, RelayPass};

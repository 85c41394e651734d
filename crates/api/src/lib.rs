//! HTTP API server and process wiring for the fulfillment workflow.
//!
//! One process hosts all three services over in-memory infrastructure: each
//! service keeps its own store and outbox, an [`OutboxRelay`] per outbox
//! publishes to a shared broker, and one [`EventConsumer`] per handler
//! drives the saga, inventory, payments, and the read-model projector.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use inventory::{
    ExpiryReaper, InMemoryInventoryStore, InventoryEventHandler, InventoryService,
};
use messaging::{
    ConsumerConfig, EventConsumer, EventHandler, IdempotentConsumer, InMemoryBroker,
    InMemoryIdempotencyStore, InMemoryOutboxStore, OutboxRelay, RelayConfig,
};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    InMemoryOrderStore, OrderProjector, OrderSagaHandler, OrderService, OrderSummaryStore,
};
use payments::{DeterministicGateway, InMemoryPaymentStore, PaymentEventHandler, PaymentService};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

pub type Orders = OrderService<InMemoryOrderStore, InMemoryOutboxStore>;
pub type Inventory = InventoryService<InMemoryInventoryStore, InMemoryOutboxStore>;
pub type Payments = PaymentService<InMemoryPaymentStore, InMemoryOutboxStore, DeterministicGateway>;
pub type Relay = OutboxRelay<InMemoryOutboxStore, InMemoryBroker>;
pub type Consumer = EventConsumer<InMemoryBroker, InMemoryIdempotencyStore>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orders: Arc<Orders>,
    pub inventory: Arc<Inventory>,
    pub payments: Arc<Payments>,
    pub summaries: OrderSummaryStore,
    pub projector: Arc<OrderProjector>,
    pub broker: InMemoryBroker,
}

/// Background workers: one relay per service outbox, one consumer per
/// handler, the reservation expiry reaper, and the idempotency-key purge.
pub struct Workers {
    pub order_relay: Relay,
    pub inventory_relay: Relay,
    pub payment_relay: Relay,
    pub consumers: Vec<Consumer>,
    pub reaper: ExpiryReaper<InMemoryInventoryStore, InMemoryOutboxStore>,
    pub idempotency: IdempotentConsumer<InMemoryIdempotencyStore>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders", get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/inventory/{sku}", get(routes::inventory::get))
        .route("/inventory/{sku}", put(routes::inventory::set_stock))
        .route(
            "/inventory/orders/{id}/release",
            post(routes::inventory::release),
        )
        .route(
            "/admin/read-model/replay",
            post(routes::admin::replay_read_model),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the three services, their relays, the consumers, and the reaper
/// over in-memory stores and a shared broker.
pub fn create_default_state(config: &Config) -> (Arc<AppState>, Workers) {
    let broker = InMemoryBroker::new();
    let idempotency = InMemoryIdempotencyStore::new();

    let relay_config = RelayConfig {
        poll_interval: config.relay_poll_interval,
        ..RelayConfig::default()
    };
    let consumer_config = ConsumerConfig {
        poll_interval: config.consumer_poll_interval,
        ..ConsumerConfig::default()
    };

    let order_store = InMemoryOrderStore::new();
    let order_outbox = InMemoryOutboxStore::new();
    let orders = Arc::new(OrderService::new(order_store, order_outbox.clone()));

    let inventory_store = InMemoryInventoryStore::new();
    let inventory_outbox = InMemoryOutboxStore::new();
    let inventory = Arc::new(InventoryService::new(
        inventory_store.clone(),
        inventory_outbox.clone(),
    ));

    let payment_store = InMemoryPaymentStore::new();
    let payment_outbox = InMemoryOutboxStore::new();
    let payments = Arc::new(PaymentService::new(
        payment_store,
        payment_outbox.clone(),
        DeterministicGateway,
    ));

    let summaries = OrderSummaryStore::new();
    let projector = Arc::new(OrderProjector::new(summaries.clone()));

    let handlers: Vec<Arc<dyn EventHandler>> = vec![
        Arc::new(OrderSagaHandler::new(orders.clone())),
        Arc::new(InventoryEventHandler::new(inventory.clone())),
        Arc::new(PaymentEventHandler::new(payments.clone())),
        projector.clone(),
    ];
    let consumers = handlers
        .into_iter()
        .map(|handler| {
            EventConsumer::new(
                broker.clone(),
                IdempotentConsumer::new(idempotency.clone()),
                handler,
                consumer_config.clone(),
            )
        })
        .collect();

    let reaper = ExpiryReaper::with_interval(
        inventory.clone(),
        inventory_store,
        config.reaper_scan_interval,
    );

    let state = Arc::new(AppState {
        orders,
        inventory,
        payments,
        summaries,
        projector,
        broker: broker.clone(),
    });

    let workers = Workers {
        order_relay: OutboxRelay::new(order_outbox, broker.clone(), relay_config.clone()),
        inventory_relay: OutboxRelay::new(inventory_outbox, broker.clone(), relay_config.clone()),
        payment_relay: OutboxRelay::new(payment_outbox, broker, relay_config),
        consumers,
        reaper,
        idempotency: IdempotentConsumer::new(idempotency),
    };

    (state, workers)
}

//! Order creation and read-model query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Currency, CustomerId, Money, OrderId, Sku};
use orders::{OrderItem, OrderSummary};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub sku: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub status: String,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub status: String,
    pub total_cents: Option<i64>,
    pub currency: Option<String>,
    pub payment_id: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl From<OrderSummary> for OrderSummaryResponse {
    fn from(summary: OrderSummary) -> Self {
        Self {
            order_id: summary.order_id.to_string(),
            customer_id: summary.customer_id.map(|c| c.to_string()),
            status: summary.status.as_str().to_string(),
            total_cents: summary.total_amount.map(|m| m.cents()),
            currency: summary.currency.map(|c| c.to_string()),
            payment_id: summary.payment_id.map(|p| p.to_string()),
            cancellation_reason: summary.cancellation_reason,
        }
    }
}

pub(crate) fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(OrderId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))
}

// -- Handlers --

/// POST /orders — creates an order and starts the fulfillment workflow.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    if req.customer_id.is_empty() {
        return Err(ApiError::BadRequest("customer_id is required".to_string()));
    }

    let items: Vec<OrderItem> = req
        .items
        .iter()
        .map(|i| OrderItem {
            sku: Sku::new(i.sku.as_str()),
            quantity: i.quantity,
            unit_price: Money::from_cents(i.unit_price_cents),
        })
        .collect();

    let order = state
        .orders
        .create_order(CustomerId::new(req.customer_id), items, Currency::usd())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            order_id: order.id.to_string(),
            status: order.status.as_str().to_string(),
            total_cents: order.total_amount.cents(),
        }),
    ))
}

/// GET /orders/{id} — returns one order from the read model.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderSummaryResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let summary = state
        .summaries
        .get(order_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {order_id}")))?;
    Ok(Json(summary.into()))
}

/// GET /orders — lists every order summary in the read model.
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<OrderSummaryResponse>> {
    let summaries = state.summaries.list().await;
    Json(summaries.into_iter().map(Into::into).collect())
}

//! Inventory stock and reservation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::Sku;
use inventory::{InventoryItem, InventoryReservation};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::orders::parse_order_id;

// -- Request types --

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub available: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct ItemResponse {
    pub sku: String,
    pub available_quantity: u32,
    pub reserved_quantity: u32,
}

impl From<InventoryItem> for ItemResponse {
    fn from(item: InventoryItem) -> Self {
        Self {
            sku: item.sku.to_string(),
            available_quantity: item.available_quantity,
            reserved_quantity: item.reserved_quantity,
        }
    }
}

#[derive(Serialize)]
pub struct ReleasedReservationResponse {
    pub reservation_id: String,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub order_id: String,
    pub released: Vec<ReleasedReservationResponse>,
}

fn to_released(reservations: Vec<InventoryReservation>) -> Vec<ReleasedReservationResponse> {
    reservations
        .into_iter()
        .map(|r| ReleasedReservationResponse {
            reservation_id: r.id.to_string(),
            sku: r.sku.to_string(),
            quantity: r.quantity,
        })
        .collect()
}

// -- Handlers --

/// GET /inventory/{sku} — returns current stock for one SKU.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let sku = Sku::new(sku);
    let item = state
        .inventory
        .get_item(&sku)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("inventory item not found: {sku}")))?;
    Ok(Json(item.into()))
}

/// PUT /inventory/{sku} — sets available stock for a SKU. Reserved
/// quantity is untouched.
#[tracing::instrument(skip(state, req))]
pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item = state
        .inventory
        .set_stock(Sku::new(sku), req.available)
        .await?;
    Ok(Json(item.into()))
}

/// POST /inventory/orders/{id}/release — manually releases every active
/// reservation for the order, reporting exactly what was released.
#[tracing::instrument(skip(state))]
pub async fn release(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let released = state.inventory.release_for_order(order_id).await?;
    Ok(Json(ReleaseResponse {
        order_id: order_id.to_string(),
        released: to_released(released),
    }))
}

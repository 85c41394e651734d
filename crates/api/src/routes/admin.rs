//! Administrative endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct ReplayResponse {
    pub events_replayed: u64,
}

/// POST /admin/read-model/replay — rebuilds the order read model from the
/// earliest offset of every topic.
#[tracing::instrument(skip(state))]
pub async fn replay_read_model(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReplayResponse>, ApiError> {
    let events_replayed = state.projector.replay_all(&state.broker).await?;
    Ok(Json(ReplayResponse { events_replayed }))
}

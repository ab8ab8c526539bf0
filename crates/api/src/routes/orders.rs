//! Order status lookup endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use history_store::{HistoryStore, StateTransition};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: HistoryStore> {
    pub store: S,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub id: i64,
    pub file_id: Option<String>,
    pub order_id: Option<String>,
    pub distributor_id: Option<i32>,
    pub previous_state: Option<String>,
    pub current_state: String,
    pub source_service: String,
    pub event_time: DateTime<Utc>,
}

impl From<StateTransition> for TransitionResponse {
    fn from(row: StateTransition) -> Self {
        Self {
            id: row.id,
            file_id: row.file_id,
            order_id: row.order_id,
            distributor_id: row.distributor_id,
            previous_state: row.previous_state,
            current_state: row.current_state,
            source_service: row.source_service,
            event_time: row.event_time,
        }
    }
}

/// GET /orders/{order_id}/status — most recent recorded transition
/// for an order.
#[tracing::instrument(skip(state))]
pub async fn status<S: HistoryStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(order_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let latest = state
        .store
        .find_latest_by_order(&order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no status recorded for order {order_id}")))?;

    Ok(Json(latest.into()))
}

//! Monitor health endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{HistoryResponse, MonitorStatus, MonitorsResponse},
};

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

/// GET /api/v1/monitors
///
/// Every registered monitor (active or not) with its current record
pub async fn list_monitors(State(state): State<ApiState>) -> ApiResult<Json<MonitorsResponse>> {
    let mut monitors = Vec::new();
    let mut cursor = None;

    loop {
        let page = state
            .registry
            .list_page(cursor, state.registry.page_size())
            .await?;
        monitors.extend(page.monitors);

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let records = state.store.list_records().await?;

    let monitors: Vec<_> = monitors
        .iter()
        .map(|m| MonitorStatus::new(m, records.get(&m.id)))
        .collect();

    Ok(Json(MonitorsResponse {
        count: monitors.len(),
        monitors,
    }))
}

/// GET /api/v1/monitors/:id
pub async fn get_monitor(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MonitorStatus>> {
    let monitor = state
        .registry
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("monitor `{id}` not found")))?;

    let stored = state.store.get(&id).await?;

    Ok(Json(MonitorStatus::new(&monitor, stored.as_ref())))
}

/// GET /api/v1/monitors/:id/history?limit=N
///
/// Most recent checks first
pub async fn get_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ApiError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }

    if state.registry.get(&id).await?.is_none() {
        return Err(ApiError::NotFound(format!("monitor `{id}` not found")));
    }

    let checks = state.store.query_history(&id, limit).await?;

    Ok(Json(HistoryResponse {
        monitor_id: id,
        count: checks.len(),
        checks,
    }))
}

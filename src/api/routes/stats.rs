//! Pipeline statistics endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{StatsResponse, StorageStatus},
};

/// GET /api/v1/stats
///
/// Dispatch counters, queue depth and store health
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let queue = state.queue.stats().await?;

    let storage = match state.store.health_check().await {
        Ok(status) => StorageStatus {
            healthy: status.healthy,
            message: status.message,
        },
        Err(e) => StorageStatus {
            healthy: false,
            message: e.to_string(),
        },
    };

    let now = Utc::now();

    Ok(Json(StatsResponse {
        timestamp: now.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds(),
        dispatch: state.handler.stats(),
        queue,
        storage,
    }))
}

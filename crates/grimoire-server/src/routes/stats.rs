//! Stats route.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::ApiResult;
use crate::state::AppState;
use grimoire_runtime::RuntimeStatus;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/stats", get(get_stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueCounts {
    queued: usize,
    processing: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(flatten)]
    status: RuntimeStatus,
    ingest_queue: QueueCounts,
    port: u16,
}

/// GET /api/stats: corpus statistics plus ingestion queue depth.
async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let status = state.orchestrator.status().await?;
    let (queued, processing) = state.queue_depth();
    Ok(Json(StatsResponse {
        status,
        ingest_queue: QueueCounts { queued, processing },
        port: state.config.port,
    }))
}

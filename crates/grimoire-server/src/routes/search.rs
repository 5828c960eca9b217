//! Rules search routes.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use super::ApiResult;
use crate::state::AppState;
use grimoire_resolve::{SearchRequest, SearchResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/rules/search", get(search_get).post(search_post))
}

/// GET /api/rules/search?query=...&mode=...&limit=...&offset=...&documentId=...
async fn search_get(
    State(state): State<Arc<AppState>>,
    Query(request): Query<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    Ok(Json(state.orchestrator.search(&request).await?))
}

/// POST /api/rules/search
async fn search_post(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    Ok(Json(state.orchestrator.search(&request).await?))
}

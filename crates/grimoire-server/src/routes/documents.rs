//! Rulebook document routes: ingestion queue, listing, outline, deletion, backfill.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{not_found, ApiError, ApiResult};
use crate::state::{AppState, IngestJob};
use grimoire_core::Error;
use grimoire_ingest::IngestRequest;
use grimoire_runtime::orchestrator::DEFAULT_BACKFILL_BATCH;
use grimoire_runtime::BackfillReport;
use grimoire_store::{ChapterOutline, Document};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rules/documents", post(create_document).get(list_documents))
        .route(
            "/rules/documents/{id}",
            get(get_document).delete(delete_document),
        )
        .route("/rules/jobs", get(list_jobs))
        .route("/rules/jobs/{job_id}", get(get_job))
        .route("/rules/embeddings/backfill", post(backfill))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueuedResponse {
    job_id: String,
    status: &'static str,
}

/// POST /api/rules/documents: queue a rulebook for ingestion.
async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<QueuedResponse>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError(Error::Validation("name must not be empty".into())));
    }
    if request.text.trim().is_empty() {
        return Err(ApiError(Error::Validation("rulebook text is empty".into())));
    }
    if request.source.trim().is_empty() {
        return Err(ApiError(Error::Validation("source must not be empty".into())));
    }

    let job_id = state.enqueue(request);
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            job_id,
            status: "queued",
        }),
    ))
}

/// GET /api/rules/documents
async fn list_documents(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(state.store().list_documents()?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentDetail {
    document: Document,
    chapters: Vec<ChapterOutline>,
}

/// GET /api/rules/documents/{id}: document with its chapter/section outline.
async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DocumentDetail>> {
    let document = state
        .store()
        .get_document(id)?
        .ok_or_else(|| not_found(format!("document {}", id)))?;
    let chapters = state.store().document_outline(id)?;
    Ok(Json(DocumentDetail { document, chapters }))
}

/// DELETE /api/rules/documents/{id}
async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.store().delete_document(id)? {
        return Err(not_found(format!("document {}", id)));
    }
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}

/// GET /api/rules/jobs: newest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let jobs = state.jobs.read();
    let mut all: Vec<&IngestJob> = jobs.values().collect();
    all.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));

    Json(serde_json::json!({
        "jobs": all,
        "total": all.len(),
    }))
}

/// GET /api/rules/jobs/{job_id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<IngestJob>> {
    state
        .jobs
        .read()
        .get(&job_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("job {}", job_id)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackfillParams {
    batch_size: Option<usize>,
}

/// POST /api/rules/embeddings/backfill
async fn backfill(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BackfillParams>,
) -> ApiResult<Json<BackfillReport>> {
    let batch = params.batch_size.unwrap_or(DEFAULT_BACKFILL_BATCH);
    Ok(Json(state.orchestrator.backfill_embeddings(batch).await?))
}

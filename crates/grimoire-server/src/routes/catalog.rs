//! Categories, spells and monsters.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{not_found, ApiError, ApiResult};
use crate::state::AppState;
use grimoire_core::Error;
use grimoire_store::{Category, MonsterStats, SpellDefinition};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rules/categories", get(list_categories).post(create_category))
        .route(
            "/rules/entries/{entry_id}/categories/{category_id}",
            post(tag_entry),
        )
        .route("/rules/spells", get(list_spells))
        .route("/rules/spells/{name}", get(get_spell))
        .route("/rules/monsters", get(list_monsters))
        .route("/rules/monsters/{name}", get(get_monster))
}

// ---------------------------------------------------------------
// Categories
// ---------------------------------------------------------------

async fn list_categories(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.store().list_categories()?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewCategoryRequest {
    name: String,
    parent_id: Option<i64>,
    description: Option<String>,
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError(Error::Validation("category name must not be empty".into())));
    }
    let id = state
        .store()
        .create_category(name, req.parent_id, req.description.as_deref())?;
    Ok((
        StatusCode::CREATED,
        Json(Category {
            id,
            name: name.to_string(),
            parent_id: req.parent_id,
            description: req.description,
        }),
    ))
}

async fn tag_entry(
    State(state): State<Arc<AppState>>,
    Path((entry_id, category_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Vec<Category>>> {
    state.store().tag_entry(entry_id, category_id)?;
    Ok(Json(state.store().categories_for_entry(entry_id)?))
}

// ---------------------------------------------------------------
// Spells and monsters
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SourceFilter {
    source: Option<String>,
}

async fn list_spells(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SourceFilter>,
) -> ApiResult<Json<Vec<SpellDefinition>>> {
    Ok(Json(state.store().list_spells(filter.source.as_deref())?))
}

async fn get_spell(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<SpellDefinition>> {
    state
        .store()
        .get_spell(&name)?
        .map(Json)
        .ok_or_else(|| not_found(format!("spell {}", name)))
}

async fn list_monsters(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SourceFilter>,
) -> ApiResult<Json<Vec<MonsterStats>>> {
    Ok(Json(state.store().list_monsters(filter.source.as_deref())?))
}

async fn get_monster(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<MonsterStats>> {
    state
        .store()
        .get_monster(&name)?
        .map(Json)
        .ok_or_else(|| not_found(format!("monster {}", name)))
}

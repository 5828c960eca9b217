//! HTTP route handlers.

pub mod catalog;
pub mod documents;
pub mod search;
pub mod stats;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use grimoire_core::Error;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(stats::routes())
        .merge(search::routes())
        .merge(documents::routes())
        .merge(catalog::routes())
}

/// A core error rendered as `{ "error": ... }` with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateContent(_) | Error::DuplicateCategory(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub(crate) fn not_found(what: impl std::fmt::Display) -> ApiError {
    ApiError(Error::NotFound(what.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let status = |e: Error| ApiError(e).status();
        assert_eq!(status(Error::Validation("q".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::NotFound("doc".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::DuplicateContent("h".into())), StatusCode::CONFLICT);
        assert_eq!(status(Error::DuplicateCategory("c".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(Error::Database("locked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

//! Grimoire server: HTTP API and background ingestion over the rules corpus.

pub mod indexing;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;

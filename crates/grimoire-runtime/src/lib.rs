//! Runtime orchestrator: coordinates ingestion, embedding and search.
//!
//! Owns the shared store, the embedding provider and the search engine, and runs the
//! synchronous store work on tokio's blocking pool.

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;

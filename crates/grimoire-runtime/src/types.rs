//! Runtime types.

use serde::Serialize;

use grimoire_store::StoreStats;

/// Outcome of an embedding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    /// Entries that received an embedding.
    pub embedded: usize,
    /// Distinct entries whose embedding could not be computed or stored.
    pub failed: usize,
}

/// Runtime status information.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub store: StoreStats,
    pub embedding_available: bool,
    pub embedding_dimension: usize,
    pub rrf_k: f64,
    pub candidate_pool: usize,
}

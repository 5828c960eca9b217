//! The query contract the retrieval engine consumes.
//!
//! `SqliteStore` is the production implementation; the engine only ever sees
//! `Arc<dyn CorpusStore>`, so tests can substitute an in-memory corpus.

use serde::Serialize;

use crate::types::{Chapter, Document, Entry, Section};
use grimoire_core::Result;

/// An entry id with the relevance score the backend assigned it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntry {
    pub entry_id: i64,
    pub score: f64,
}

/// An entry together with its owning section, chapter and document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryContext {
    pub entry: Entry,
    pub section: Section,
    pub chapter: Chapter,
    pub document: Document,
}

/// Read-side primitives of the corpus. All results are ordered best-first and only
/// include entries of `completed` documents.
pub trait CorpusStore: Send + Sync {
    /// Full-text search. Scores are the backend's own relevance (higher is better).
    fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<ScoredEntry>>;

    /// Nearest-neighbour search. Scores are similarities in `[0, 1]`.
    fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<ScoredEntry>>;

    /// Resolve entry ids to full context, preserving input order. Ids that cannot be
    /// resolved are dropped.
    fn fetch_entries_with_context(&self, entry_ids: &[i64]) -> Result<Vec<EntryContext>>;
}

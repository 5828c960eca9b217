//! Grimoire Resolve: hybrid retrieval over the rulebook corpus.
//!
//! Full-text and semantic candidates are fused with reciprocal rank fusion, enriched
//! with their chapter/section context, and decorated with highlighted snippets.

pub mod fusion;
pub mod highlight;
pub mod hybrid;
pub mod types;

pub use hybrid::HybridSearchEngine;
pub use types::*;

//! Grimoire Infer: embedding providers and the query embedding cache.
//!
//! When `GRIMOIRE_EMBEDDING_URL` points at an Ollama-compatible server,
//! `OllamaEmbedder` produces embeddings over HTTP. Without it, `NoopEmbedder` is used
//! and search falls back to full-text only.

pub mod cache;
pub mod embedder;
pub mod ollama;

pub use cache::QueryCache;
pub use embedder::{EmbeddingProvider, NoopEmbedder};
pub use ollama::OllamaEmbedder;

use std::sync::Arc;

use grimoire_core::EmbeddingSettings;

/// Create the embedding provider described by `settings`.
///
/// Falls back to `NoopEmbedder` when no URL is configured or the client cannot be built.
pub fn create_embedder(settings: &EmbeddingSettings) -> Arc<dyn EmbeddingProvider> {
    if let Some(url) = settings.url.as_deref() {
        match OllamaEmbedder::new(url, settings) {
            Ok(embedder) => {
                tracing::info!(
                    "Using embedding endpoint {} (model={}, dim={})",
                    url,
                    embedder.model(),
                    settings.dimension
                );
                return Arc::new(embedder);
            }
            Err(e) => {
                tracing::warn!("Embedding endpoint unavailable: {}. Using full-text search only.", e);
            }
        }
    } else {
        tracing::info!("No embedding endpoint configured. Using full-text search only.");
    }

    Arc::new(NoopEmbedder::new(settings.dimension))
}

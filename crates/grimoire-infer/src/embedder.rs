//! Embedding provider trait.
//!
//! Implementations:
//! - `OllamaEmbedder`: HTTP client for an Ollama-compatible `/api/embeddings` endpoint
//! - `NoopEmbedder`: never available, so search runs lexical-only

use async_trait::async_trait;

use grimoire_core::{Error, Result};

/// Source of fixed-dimension text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. The vector length always equals [`dimension`](Self::dimension).
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a search query. Providers may serve repeated queries from a cache;
    /// corpus text goes through [`embed`](Self::embed) and never fills it.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }

    fn dimension(&self) -> usize;

    /// Whether `embed` can be expected to succeed at all.
    fn is_available(&self) -> bool;
}

/// Placeholder provider used when no embedding endpoint is configured.
pub struct NoopEmbedder {
    dim: usize,
}

impl NoopEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for NoopEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Inference("no embedding provider configured".into()))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_is_unavailable() {
        let embedder = NoopEmbedder::new(768);
        assert!(!embedder.is_available());
        assert_eq!(embedder.dimension(), 768);
        assert!(matches!(
            embedder.embed("fireball").await,
            Err(Error::Inference(_))
        ));
    }
}

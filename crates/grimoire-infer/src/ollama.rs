//! HTTP embedding provider for Ollama-compatible endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::QueryCache;
use crate::embedder::EmbeddingProvider;
use grimoire_core::{EmbeddingSettings, Error, Result};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embeds text with `POST {base}/api/embeddings`.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dim: usize,
    cache: QueryCache,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, settings: &EmbeddingSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            dim: settings.dimension,
            cache: QueryCache::default_cache(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Malformed embedding response: {}", e)))?;

        if parsed.embedding.len() != self.dim {
            return Err(Error::Inference(format!(
                "Model {} returned {} dimensions, expected {}",
                self.model,
                parsed.embedding.len(),
                self.dim
            )));
        }

        debug!("Embedded {} chars with {}", text.len(), self.model);
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.get(query) {
            return Ok(hit);
        }
        let embedding = self.request(query).await?;
        self.cache.put(query, embedding.clone());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn is_available(&self) -> bool {
        true
    }
}

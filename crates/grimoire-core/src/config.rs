//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Paths to all Grimoire data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Corpus database directory (`data/corpus/`).
    pub corpus: PathBuf,
    /// Uploaded rulebook files (`data/uploads/`).
    pub uploads: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            corpus: root.join("corpus"),
            uploads: root.join("uploads"),
            root,
        };
        std::fs::create_dir_all(&paths.corpus)?;
        std::fs::create_dir_all(&paths.uploads)?;
        Ok(paths)
    }
}

/// Where query and entry embeddings come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Base URL of an Ollama-compatible endpoint. `None` leaves the provider unavailable.
    pub url: Option<String>,
    pub model: String,
    /// Fixed vector length every stored embedding must match.
    pub dimension: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            url: None,
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            timeout_ms: 10_000,
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Tunables for the hybrid retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// RRF damping constant.
    pub rrf_k: f64,
    /// Candidates requested from each sub-search.
    pub candidate_pool: usize,
    pub lexical_timeout_ms: u64,
    /// Covers both the query embedding and the vector lookup.
    pub semantic_timeout_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            candidate_pool: 50,
            lexical_timeout_ms: 2_000,
            semantic_timeout_ms: 3_000,
        }
    }
}

impl SearchSettings {
    pub fn lexical_timeout(&self) -> Duration {
        Duration::from_millis(self.lexical_timeout_ms)
    }

    pub fn semantic_timeout(&self) -> Duration {
        Duration::from_millis(self.semantic_timeout_ms)
    }
}

/// Top-level Grimoire configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrimoireConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    pub embedding: EmbeddingSettings,
    pub search: SearchSettings,
}

impl GrimoireConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let data_paths = DataPaths::new(data_dir)?;
        let embedding_defaults = EmbeddingSettings::default();
        let search_defaults = SearchSettings::default();

        let embedding = EmbeddingSettings {
            url: std::env::var("GRIMOIRE_EMBEDDING_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            model: std::env::var("GRIMOIRE_EMBEDDING_MODEL").unwrap_or(embedding_defaults.model),
            dimension: env_or("GRIMOIRE_EMBEDDING_DIM", embedding_defaults.dimension),
            timeout_ms: env_or("GRIMOIRE_EMBEDDING_TIMEOUT_MS", embedding_defaults.timeout_ms),
        };

        let search = SearchSettings {
            rrf_k: env_or("GRIMOIRE_RRF_K", search_defaults.rrf_k),
            candidate_pool: env_or("GRIMOIRE_CANDIDATE_POOL", search_defaults.candidate_pool),
            lexical_timeout_ms: env_or(
                "GRIMOIRE_LEXICAL_TIMEOUT_MS",
                search_defaults.lexical_timeout_ms,
            ),
            semantic_timeout_ms: env_or(
                "GRIMOIRE_SEMANTIC_TIMEOUT_MS",
                search_defaults.semantic_timeout_ms,
            ),
        };

        Ok(Self {
            port: env_or("PORT", 3010),
            data_paths,
            embedding,
            search,
        })
    }
}

/// Read and parse an environment variable, falling back on absence or a parse failure.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_defaults() {
        let settings = SearchSettings::default();
        assert_eq!(settings.rrf_k, 60.0);
        assert_eq!(settings.candidate_pool, 50);
        assert_eq!(settings.semantic_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_data_paths_created() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("grimoire")).unwrap();
        assert!(paths.corpus.is_dir());
        assert!(paths.uploads.is_dir());
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("GRIMOIRE_TEST_UNSET_VARIABLE", 42usize), 42);
    }
}

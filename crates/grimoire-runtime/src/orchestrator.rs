//! Orchestrator: ingestion, embedding and search over one shared store.

use std::path::PathBuf;
use std::sync::Arc;

use grimoire_core::{Error, Result, SearchSettings};
use grimoire_infer::EmbeddingProvider;
use grimoire_ingest::{IngestReport, IngestRequest, Ingester};
use grimoire_resolve::{HybridSearchEngine, SearchRequest, SearchResponse};
use grimoire_store::{CorpusStore, Entry, SqliteStore};
use tracing::{debug, info, warn};

use crate::types::*;

pub const DEFAULT_BACKFILL_BATCH: usize = 50;

pub struct Orchestrator {
    store: Arc<SqliteStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: HybridSearchEngine,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SqliteStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: SearchSettings,
    ) -> Self {
        let corpus: Arc<dyn CorpusStore> = store.clone();
        let engine = HybridSearchEngine::new(corpus, Arc::clone(&embedder), settings);
        info!(
            "Orchestrator initialized: semantic search {}",
            if embedder.is_available() { "enabled" } else { "disabled" }
        );
        Self {
            store,
            embedder,
            engine,
        }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Run `f` against the store on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::Internal(format!("store task failed: {}", e)))?
    }

    /// Parse and persist a rulebook, then embed its entries when a provider is available.
    ///
    /// Embedding failures do not fail the ingestion; the entries are left for
    /// [`Orchestrator::backfill_embeddings`].
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let report = self
            .with_store(move |store| Ingester::new(store).ingest_text(&request))
            .await?;
        self.embed_document(report.document_id).await;
        Ok(report)
    }

    /// Ingest a `.txt`/`.md` rulebook from disk. `None` when no text could be extracted.
    pub async fn ingest_file(&self, path: PathBuf, source: String) -> Result<Option<IngestReport>> {
        let report = self
            .with_store(move |store| Ingester::new(store).ingest_file(&path, &source))
            .await?;
        if let Some(report) = &report {
            self.embed_document(report.document_id).await;
        }
        Ok(report)
    }

    async fn embed_document(&self, document_id: i64) -> BackfillReport {
        if !self.embedder.is_available() {
            return BackfillReport::default();
        }
        let entries = match self
            .with_store(move |store| store.entries_for_document(document_id))
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not load entries of document {}: {}", document_id, e);
                return BackfillReport::default();
            }
        };

        let mut report = BackfillReport::default();
        for entry in &entries {
            if self.embed_entry(entry).await {
                report.embedded += 1;
            } else {
                report.failed += 1;
            }
        }
        info!(
            "Embedded {} entries for document {} ({} failed)",
            report.embedded, document_id, report.failed
        );
        report
    }

    /// Embed every entry of a completed document that has no embedding yet.
    ///
    /// Safe to re-run: entries that already have an embedding are not revisited. Each
    /// run walks the pending entries once in id order, so an entry the provider rejects
    /// is counted as failed and never blocks the entries after it.
    pub async fn backfill_embeddings(&self, batch_size: usize) -> Result<BackfillReport> {
        let mut report = BackfillReport::default();
        if !self.embedder.is_available() {
            info!("No embedding provider, skipping backfill");
            return Ok(report);
        }

        let batch_size = batch_size.max(1);
        let mut cursor = 0;
        loop {
            let batch = self
                .with_store(move |store| store.entries_without_embedding(cursor, batch_size))
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = last.id;

            let mut progress = 0;
            for entry in &batch {
                if self.embed_entry(entry).await {
                    progress += 1;
                }
            }
            report.embedded += progress;
            report.failed += batch.len() - progress;
            debug!(
                "Backfill batch up to entry {}: {} of {} entries embedded",
                cursor,
                progress,
                batch.len()
            );
        }

        info!(
            "Backfill complete: {} embedded, {} failed",
            report.embedded, report.failed
        );
        Ok(report)
    }

    async fn embed_entry(&self, entry: &Entry) -> bool {
        let embedding = match self.embedder.embed(&embedding_text(entry)).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Could not embed entry {}: {}", entry.id, e);
                return false;
            }
        };
        let entry_id = entry.id;
        match self
            .with_store(move |store| store.set_entry_embedding(entry_id, &embedding))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not store embedding for entry {}: {}", entry_id, e);
                false
            }
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.engine.search(request).await
    }

    pub async fn status(&self) -> Result<RuntimeStatus> {
        let stats = self.with_store(|store| store.get_stats()).await?;
        let settings = self.engine.settings();
        Ok(RuntimeStatus {
            store: stats,
            embedding_available: self.embedder.is_available(),
            embedding_dimension: self.embedder.dimension(),
            rrf_k: settings.rrf_k,
            candidate_pool: settings.candidate_pool,
        })
    }
}

/// Entry text as sent to the embedding provider.
fn embedding_text(entry: &Entry) -> String {
    match entry.title.as_deref() {
        Some(title) if !title.is_empty() => format!("{}\n{}", title, entry.body),
        _ => entry.body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grimoire_infer::NoopEmbedder;
    use grimoire_resolve::{MatchType, SearchMode};
    use grimoire_store::FileType;

    const DIM: usize = 4;

    const COMBAT: &str = "\
Part 2: Playing the Game

Ch. 9: Combat
A typical combat encounter is a clash between two sides.

Initiative determines the order of turns during combat.

Making an Attack
Whether you strike with a melee weapon or fire a weapon at range, an attack has a simple structure.
";

    /// Deterministic embeddings derived from letter counts.
    struct LetterEmbedder {
        fail: bool,
        /// Texts containing this word are rejected.
        reject: Option<&'static str>,
    }

    impl LetterEmbedder {
        fn working() -> Self {
            Self {
                fail: false,
                reject: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                reject: None,
            }
        }

        fn rejecting(word: &'static str) -> Self {
            Self {
                fail: false,
                reject: Some(word),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(Error::Inference("connection refused".into()));
            }
            if self.reject.map_or(false, |word| text.contains(word)) {
                return Err(Error::Inference("input rejected".into()));
            }
            let lower = text.to_lowercase();
            let count = |c: char| lower.chars().filter(|&x| x == c).count() as f32;
            Ok(vec![count('a') + 1.0, count('e'), count('i'), count('o')])
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn test_store() -> (Arc<SqliteStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path(), DIM).unwrap();
        (Arc::new(store), dir)
    }

    fn orchestrator(store: &Arc<SqliteStore>, embedder: Arc<dyn EmbeddingProvider>) -> Orchestrator {
        Orchestrator::new(Arc::clone(store), embedder, SearchSettings::default())
    }

    fn request(text: &str) -> IngestRequest {
        IngestRequest {
            name: "Basic Rules".into(),
            text: text.into(),
            source: "basic_rules".into(),
            file_type: FileType::Text,
        }
    }

    #[tokio::test]
    async fn test_ingest_then_fulltext_search() {
        let (store, _dir) = test_store();
        let orch = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)));
        orch.ingest(request(COMBAT)).await.unwrap();

        let response = orch
            .search(&SearchRequest::new("combat initiative", SearchMode::Fulltext))
            .await
            .unwrap();
        assert_eq!(response.total, 2);
        assert!(response
            .results
            .iter()
            .all(|r| r.section_title == "Combat"));
        let hit = &response.results[0];
        assert!(hit.content.starts_with("Initiative"));
        assert_eq!(hit.chapter_title, "Combat");
        assert_eq!(hit.section_title, "Combat");
        assert_eq!(hit.chapter_number, Some(9));
        assert_eq!(hit.part.as_deref(), Some("Playing the Game"));
        assert_eq!(hit.match_type, MatchType::Fulltext);
        assert!(hit.highlights[0].contains("**Initiative**"));
    }

    #[tokio::test]
    async fn test_ingest_embeds_when_available() {
        let (store, _dir) = test_store();
        let orch = orchestrator(&store, Arc::new(LetterEmbedder::working()));
        let report = orch.ingest(request(COMBAT)).await.unwrap();

        let status = orch.status().await.unwrap();
        assert_eq!(status.store.embeddings_stored as usize, report.entries);
        assert!(status.embedding_available);

        let response = orch
            .search(&SearchRequest::new("melee weapon", SearchMode::Semantic))
            .await
            .unwrap();
        assert_eq!(response.total, report.entries);
        assert!(response
            .results
            .iter()
            .all(|r| r.match_type == MatchType::Semantic));
    }

    #[tokio::test]
    async fn test_hybrid_labels_overlap() {
        let (store, _dir) = test_store();
        let orch = orchestrator(&store, Arc::new(LetterEmbedder::working()));
        orch.ingest(request(COMBAT)).await.unwrap();

        let response = orch
            .search(&SearchRequest::new("initiative", SearchMode::Hybrid))
            .await
            .unwrap();
        let initiative = response
            .results
            .iter()
            .find(|r| r.content.starts_with("Initiative"))
            .unwrap();
        assert_eq!(initiative.match_type, MatchType::Hybrid);
    }

    #[tokio::test]
    async fn test_backfill_is_idempotent() {
        let (store, _dir) = test_store();
        let report = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)))
            .ingest(request(COMBAT))
            .await
            .unwrap();

        let orch = orchestrator(&store, Arc::new(LetterEmbedder::working()));
        let first = orch.backfill_embeddings(2).await.unwrap();
        assert_eq!(first.embedded, report.entries);
        assert_eq!(first.failed, 0);

        let second = orch.backfill_embeddings(2).await.unwrap();
        assert_eq!(second, BackfillReport::default());
    }

    #[tokio::test]
    async fn test_backfill_stops_when_provider_fails() {
        let (store, _dir) = test_store();
        let report = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)))
            .ingest(request(COMBAT))
            .await
            .unwrap();

        let orch = orchestrator(&store, Arc::new(LetterEmbedder::failing()));
        let backfill = orch
            .backfill_embeddings(DEFAULT_BACKFILL_BATCH)
            .await
            .unwrap();
        assert_eq!(backfill.embedded, 0);
        assert_eq!(backfill.failed, report.entries);
    }

    #[tokio::test]
    async fn test_backfill_skips_rejected_entries() {
        const RULES: &str = "Ch. 1: Rules\npoison one.\n\npoison two.\n\nHealthy paragraph three.\n\nHealthy paragraph four.";
        let (store, _dir) = test_store();
        let report = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)))
            .ingest(request(RULES))
            .await
            .unwrap();
        assert_eq!(report.entries, 4);

        let orch = orchestrator(&store, Arc::new(LetterEmbedder::rejecting("poison")));
        let first = orch.backfill_embeddings(2).await.unwrap();
        assert_eq!(first, BackfillReport { embedded: 2, failed: 2 });

        let pending = store.entries_without_embedding(0, 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|e| e.body.starts_with("poison")));

        let second = orch.backfill_embeddings(2).await.unwrap();
        assert_eq!(second, BackfillReport { embedded: 0, failed: 2 });
    }

    #[tokio::test]
    async fn test_backfill_without_provider() {
        let (store, _dir) = test_store();
        let orch = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)));
        orch.ingest(request(COMBAT)).await.unwrap();
        let report = orch.backfill_embeddings(10).await.unwrap();
        assert_eq!(report, BackfillReport::default());
    }

    #[tokio::test]
    async fn test_duplicate_ingest() {
        let (store, _dir) = test_store();
        let orch = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)));
        orch.ingest(request(COMBAT)).await.unwrap();
        let result = orch.ingest(request(COMBAT)).await;
        assert!(matches!(result, Err(Error::DuplicateContent(_))));
    }

    #[tokio::test]
    async fn test_ingest_file() {
        let (store, dir) = test_store();
        let orch = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)));
        let path = dir.path().join("combat.md");
        std::fs::write(&path, COMBAT).unwrap();

        let report = orch
            .ingest_file(path, "basic_rules".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.chapters, 1);
    }

    #[tokio::test]
    async fn test_invalid_query() {
        let (store, _dir) = test_store();
        let orch = orchestrator(&store, Arc::new(NoopEmbedder::new(DIM)));
        let result = orch
            .search(&SearchRequest::new(" ", SearchMode::Hybrid))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_embedding_text() {
        let entry = Entry {
            id: 1,
            section_id: 1,
            title: Some("Combat".into()),
            body: "Roll initiative.".into(),
            order_index: 0,
            page: None,
        };
        assert_eq!(embedding_text(&entry), "Combat\nRoll initiative.");
    }
}

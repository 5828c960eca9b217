//! Hybrid search engine: FTS5 + vector similarity fused with RRF.
//!
//! Sub-searches run concurrently with their own time budgets. A sub-search that fails,
//! times out, or has no embedder contributes an empty list; only an invalid query is
//! reported to the caller as an error.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::fusion::{normalize_by_max, reciprocal_rank_fusion};
use crate::highlight::{highlight, query_tokens};
use crate::types::*;
use grimoire_core::{Error, Result, SearchSettings};
use grimoire_infer::EmbeddingProvider;
use grimoire_store::{CorpusStore, EntryContext, ScoredEntry};

pub struct HybridSearchEngine {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: SearchSettings,
}

impl HybridSearchEngine {
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run a search and return one page of enriched, highlighted results.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let params = request.validate()?;

        let ranked = match params.mode {
            SearchMode::Fulltext => self.lexical(&params).await,
            SearchMode::Semantic => self.semantic(&params).await,
            SearchMode::Hybrid => self.hybrid(&params).await,
        };

        let contexts = self.enrich(&ranked).await;
        let total = contexts.len();
        let tokens = query_tokens(&params.query);

        let results: Vec<SearchResult> = contexts
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|(ranked, ctx)| to_result(ranked, ctx, &tokens))
            .collect();

        debug!(
            "Search '{}' ({}): {} of {} results",
            params.query,
            params.mode.as_str(),
            results.len(),
            total
        );

        Ok(SearchResponse {
            results,
            total,
            query: params.query,
            mode: params.mode,
        })
    }

    async fn hybrid(&self, params: &SearchParams) -> Vec<RankedEntry> {
        let (lexical, semantic) = tokio::join!(self.lexical(params), self.semantic(params));

        if semantic.is_empty() {
            return lexical;
        }
        if lexical.is_empty() {
            return semantic;
        }
        reciprocal_rank_fusion(&lexical, &semantic, self.settings.rrf_k)
    }

    async fn lexical(&self, params: &SearchParams) -> Vec<RankedEntry> {
        let store = Arc::clone(&self.store);
        let query = params.query.clone();
        let pool = self.settings.candidate_pool;
        let document_id = params.document_id;
        let task =
            tokio::task::spawn_blocking(move || store.lexical_search(&query, pool, document_id));

        match tokio::time::timeout(self.settings.lexical_timeout(), task).await {
            Ok(Ok(Ok(hits))) => normalize_by_max(&hits, MatchType::Fulltext),
            Ok(Ok(Err(e))) => {
                warn!("Full-text search failed: {}", e);
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!("Full-text search task failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Full-text search timed out after {}ms",
                    self.settings.lexical_timeout_ms
                );
                Vec::new()
            }
        }
    }

    async fn semantic(&self, params: &SearchParams) -> Vec<RankedEntry> {
        if !self.embedder.is_available() {
            debug!("No embedding provider, skipping semantic search");
            return Vec::new();
        }

        match tokio::time::timeout(self.settings.semantic_timeout(), self.vector_hits(params))
            .await
        {
            Ok(Ok(hits)) => hits
                .into_iter()
                .map(|h| RankedEntry {
                    entry_id: h.entry_id,
                    score: h.score.clamp(0.0, 1.0),
                    match_type: MatchType::Semantic,
                })
                .collect(),
            Ok(Err(e)) => {
                warn!("Semantic search failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Semantic search timed out after {}ms",
                    self.settings.semantic_timeout_ms
                );
                Vec::new()
            }
        }
    }

    async fn vector_hits(&self, params: &SearchParams) -> Result<Vec<ScoredEntry>> {
        let embedding = self.embedder.embed_query(&params.query).await?;
        let store = Arc::clone(&self.store);
        let pool = self.settings.candidate_pool;
        let document_id = params.document_id;
        tokio::task::spawn_blocking(move || store.vector_search(&embedding, pool, document_id))
            .await
            .map_err(|e| Error::Search(format!("vector search task failed: {}", e)))?
    }

    /// Pair every ranked entry with its context, dropping ids the store no longer has.
    async fn enrich(&self, ranked: &[RankedEntry]) -> Vec<(RankedEntry, EntryContext)> {
        if ranked.is_empty() {
            return Vec::new();
        }
        let store = Arc::clone(&self.store);
        let ids: Vec<i64> = ranked.iter().map(|r| r.entry_id).collect();
        let contexts =
            match tokio::task::spawn_blocking(move || store.fetch_entries_with_context(&ids)).await
            {
                Ok(Ok(contexts)) => contexts,
                Ok(Err(e)) => {
                    warn!("Could not load search result context: {}", e);
                    return Vec::new();
                }
                Err(e) => {
                    warn!("Context lookup task failed: {}", e);
                    return Vec::new();
                }
            };

        // `contexts` preserves the order of `ranked`, minus the dropped ids.
        let mut contexts = contexts.into_iter().peekable();
        let mut out = Vec::with_capacity(ranked.len());
        for r in ranked {
            if contexts.peek().is_some_and(|c| c.entry.id == r.entry_id) {
                if let Some(ctx) = contexts.next() {
                    out.push((*r, ctx));
                }
            }
        }
        out
    }
}

fn to_result(ranked: RankedEntry, ctx: EntryContext, tokens: &[String]) -> SearchResult {
    let EntryContext {
        entry,
        section,
        chapter,
        document,
    } = ctx;
    let highlights = highlight(&entry.body, tokens);
    SearchResult {
        entry_id: entry.id,
        title: entry.title.unwrap_or_else(|| section.title.clone()),
        content: entry.body,
        section_title: section.title,
        chapter_title: chapter.title,
        chapter_number: chapter.chapter_number,
        chapter_slug: chapter.slug,
        part: chapter.part,
        document_id: document.id,
        document_name: document.name,
        page: entry.page,
        relevance: ranked.score,
        match_type: ranked.match_type,
        highlights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grimoire_store::{Chapter, Document, DocumentStatus, Entry, FileType, Section};
    use std::collections::HashMap;
    use std::time::Duration;

    /// In-memory corpus with scripted search results.
    #[derive(Default)]
    struct FakeStore {
        lexical: Vec<ScoredEntry>,
        vector: Vec<ScoredEntry>,
        bodies: HashMap<i64, String>,
        fail_lexical: bool,
        lexical_delay: Option<Duration>,
    }

    impl FakeStore {
        fn with_entries(ids: &[i64]) -> Self {
            let bodies = ids
                .iter()
                .map(|&id| (id, format!("Entry {} talks about combat. Then it rests.", id)))
                .collect();
            Self {
                bodies,
                ..Default::default()
            }
        }

        fn lexical(mut self, hits: &[(i64, f64)]) -> Self {
            self.lexical = scored(hits);
            self
        }

        fn vector(mut self, hits: &[(i64, f64)]) -> Self {
            self.vector = scored(hits);
            self
        }
    }

    fn scored(hits: &[(i64, f64)]) -> Vec<ScoredEntry> {
        hits.iter()
            .map(|&(entry_id, score)| ScoredEntry { entry_id, score })
            .collect()
    }

    fn filter(hits: &[ScoredEntry], limit: usize, document_id: Option<i64>) -> Vec<ScoredEntry> {
        hits.iter()
            .filter(|h| document_id.map_or(true, |d| h.entry_id / 100 == d))
            .take(limit)
            .copied()
            .collect()
    }

    impl CorpusStore for FakeStore {
        fn lexical_search(
            &self,
            _query: &str,
            limit: usize,
            document_id: Option<i64>,
        ) -> Result<Vec<ScoredEntry>> {
            if let Some(delay) = self.lexical_delay {
                std::thread::sleep(delay);
            }
            if self.fail_lexical {
                return Err(Error::Database("fts5 exploded".into()));
            }
            Ok(filter(&self.lexical, limit, document_id))
        }

        fn vector_search(
            &self,
            _query_embedding: &[f32],
            limit: usize,
            document_id: Option<i64>,
        ) -> Result<Vec<ScoredEntry>> {
            Ok(filter(&self.vector, limit, document_id))
        }

        fn fetch_entries_with_context(&self, entry_ids: &[i64]) -> Result<Vec<EntryContext>> {
            Ok(entry_ids
                .iter()
                .filter_map(|id| self.bodies.get(id).map(|body| context(*id, body)))
                .collect())
        }
    }

    /// Entry ids encode their document as `id / 100`.
    fn context(id: i64, body: &str) -> EntryContext {
        let document_id = id / 100;
        EntryContext {
            entry: Entry {
                id,
                section_id: 1,
                title: None,
                body: body.to_string(),
                order_index: 0,
                page: Some(12),
            },
            section: Section {
                id: 1,
                chapter_id: 1,
                title: "Combat".into(),
                order_index: 0,
                page_start: None,
                page_end: None,
                keywords: vec![],
            },
            chapter: Chapter {
                id: 1,
                document_id,
                title: "Combat".into(),
                slug: "basic_rules-ch9-combat".into(),
                chapter_number: Some(9),
                part: Some("Playing the Game".into()),
                order_index: 0,
                page_start: None,
                page_end: None,
                keywords: vec![],
            },
            document: Document {
                id: document_id,
                name: "Basic Rules".into(),
                file_type: FileType::Text,
                content_hash: "abc".into(),
                page_count: None,
                status: DocumentStatus::Completed,
                error_log: None,
                created_at: 0,
                updated_at: None,
            },
        }
    }

    struct FakeEmbedder {
        available: bool,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            if self.fail {
                return Err(Error::Inference("connection refused".into()));
            }
            Ok(vec![1.0, 0.0, 0.0])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn engine(store: FakeStore, available: bool) -> HybridSearchEngine {
        HybridSearchEngine::new(
            Arc::new(store),
            Arc::new(FakeEmbedder {
                available,
                fail: false,
            }),
            SearchSettings::default(),
        )
    }

    fn ids(response: &SearchResponse) -> Vec<i64> {
        response.results.iter().map(|r| r.entry_id).collect()
    }

    #[tokio::test]
    async fn test_identical_lists_fuse_to_same_order() {
        let hits = [(101, 0.9), (102, 0.8), (103, 0.7)];
        let store = FakeStore::with_entries(&[101, 102, 103])
            .lexical(&hits)
            .vector(&hits);
        let response = engine(store, true)
            .search(&SearchRequest::new("combat", SearchMode::Hybrid))
            .await
            .unwrap();

        assert_eq!(ids(&response), vec![101, 102, 103]);
        assert!(response
            .results
            .iter()
            .all(|r| r.match_type == MatchType::Hybrid));
        assert_eq!(response.results[0].relevance, 1.0);
    }

    #[tokio::test]
    async fn test_hybrid_without_embedder_equals_fulltext() {
        let store = || {
            FakeStore::with_entries(&[101, 102, 103])
                .lexical(&[(101, 4.0), (103, 2.0), (102, 1.0)])
                .vector(&[(102, 0.9)])
        };
        let hybrid = engine(store(), false)
            .search(&SearchRequest::new("combat", SearchMode::Hybrid))
            .await
            .unwrap();
        let fulltext = engine(store(), false)
            .search(&SearchRequest::new("combat", SearchMode::Fulltext))
            .await
            .unwrap();

        assert_eq!(ids(&hybrid), ids(&fulltext));
        assert_eq!(ids(&hybrid), vec![101, 103, 102]);
        for (h, f) in hybrid.results.iter().zip(&fulltext.results) {
            assert_eq!(h.relevance, f.relevance);
            assert_eq!(h.match_type, MatchType::Fulltext);
        }
        assert_eq!(hybrid.results[1].relevance, 0.5);
    }

    #[tokio::test]
    async fn test_semantic_mode_without_embedder_is_empty() {
        let store = FakeStore::with_entries(&[101]).vector(&[(101, 0.9)]);
        let response = engine(store, false)
            .search(&SearchRequest::new("combat", SearchMode::Semantic))
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn test_semantic_mode_keeps_similarity() {
        let store = FakeStore::with_entries(&[101, 102]).vector(&[(101, 0.8), (102, 0.4)]);
        let response = engine(store, true)
            .search(&SearchRequest::new("combat", SearchMode::Semantic))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![101, 102]);
        assert_eq!(response.results[1].relevance, 0.4);
        assert_eq!(response.results[0].match_type, MatchType::Semantic);
    }

    #[tokio::test]
    async fn test_pagination_slices_full_ranking() {
        let entry_ids: Vec<i64> = (101..=130).collect();
        let hits: Vec<(i64, f64)> = entry_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, 100.0 - i as f64))
            .collect();
        let store = || FakeStore::with_entries(&entry_ids).lexical(&hits);

        let all = engine(store(), false)
            .search(&SearchRequest::new("combat", SearchMode::Fulltext).with_page(100, 0))
            .await
            .unwrap();
        let page = engine(store(), false)
            .search(&SearchRequest::new("combat", SearchMode::Fulltext).with_page(5, 10))
            .await
            .unwrap();

        assert_eq!(all.total, 30);
        assert_eq!(page.total, 30);
        assert_eq!(ids(&page), ids(&all)[10..15].to_vec());
    }

    #[tokio::test]
    async fn test_hybrid_pages_concatenate_to_full_ranking() {
        let entry_ids: Vec<i64> = (101..=140).collect();
        let lexical: Vec<(i64, f64)> = (101..=130).map(|id| (id, 200.0 - id as f64)).collect();
        let vector: Vec<(i64, f64)> = (120..=140)
            .rev()
            .map(|id| (id, (id - 100) as f64 / 40.0))
            .collect();
        let store = || {
            FakeStore::with_entries(&entry_ids)
                .lexical(&lexical)
                .vector(&vector)
        };
        let page = |limit: i64, offset: i64| {
            let searcher = engine(store(), true);
            async move {
                searcher
                    .search(&SearchRequest::new("combat", SearchMode::Hybrid).with_page(limit, offset))
                    .await
                    .unwrap()
            }
        };

        let first = page(8, 0).await;
        let second = page(8, 8).await;
        let both = page(16, 0).await;

        assert_eq!(first.total, 40);
        assert_eq!(second.total, 40);
        let mut joined = ids(&first);
        joined.extend(ids(&second));
        assert_eq!(joined, ids(&both));
        assert_eq!(both.results.len(), 16);
    }

    #[tokio::test]
    async fn test_unresolvable_entries_are_dropped_from_total() {
        let store = FakeStore::with_entries(&[101, 103]).lexical(&[(101, 3.0), (102, 2.0), (103, 1.0)]);
        let response = engine(store, false)
            .search(&SearchRequest::new("combat", SearchMode::Fulltext))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![101, 103]);
        assert_eq!(response.total, 2);
    }

    #[tokio::test]
    async fn test_lexical_failure_degrades_to_semantic() {
        let mut store = FakeStore::with_entries(&[101, 102])
            .lexical(&[(101, 1.0)])
            .vector(&[(102, 0.7)]);
        store.fail_lexical = true;
        let response = engine(store, true)
            .search(&SearchRequest::new("combat", SearchMode::Hybrid))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![102]);
        assert_eq!(response.results[0].match_type, MatchType::Semantic);
    }

    #[tokio::test]
    async fn test_embedder_failure_degrades_to_fulltext() {
        let store = FakeStore::with_entries(&[101, 102])
            .lexical(&[(101, 1.0)])
            .vector(&[(102, 0.7)]);
        let engine = HybridSearchEngine::new(
            Arc::new(store),
            Arc::new(FakeEmbedder {
                available: true,
                fail: true,
            }),
            SearchSettings::default(),
        );
        let response = engine
            .search(&SearchRequest::new("combat", SearchMode::Hybrid))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![101]);
    }

    #[tokio::test]
    async fn test_lexical_timeout_is_abandoned() {
        let mut store = FakeStore::with_entries(&[101, 102])
            .lexical(&[(101, 1.0)])
            .vector(&[(102, 0.7)]);
        store.lexical_delay = Some(Duration::from_millis(300));
        let engine = HybridSearchEngine::new(
            Arc::new(store),
            Arc::new(FakeEmbedder {
                available: true,
                fail: false,
            }),
            SearchSettings {
                lexical_timeout_ms: 20,
                ..Default::default()
            },
        );
        let response = engine
            .search(&SearchRequest::new("combat", SearchMode::Hybrid))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![102]);
    }

    #[tokio::test]
    async fn test_invalid_query_is_an_error() {
        let result = engine(FakeStore::default(), true)
            .search(&SearchRequest::new("x", SearchMode::Hybrid))
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_document_filter_and_result_shape() {
        let store = FakeStore::with_entries(&[101, 201])
            .lexical(&[(201, 2.0), (101, 1.0)])
            .vector(&[(101, 0.5), (201, 0.4)]);
        let response = engine(store, true)
            .search(&SearchRequest::new("combat", SearchMode::Hybrid).with_document(1))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![101]);

        let result = &response.results[0];
        assert_eq!(result.document_id, 1);
        assert_eq!(result.title, "Combat");
        assert_eq!(result.chapter_number, Some(9));
        assert_eq!(result.page, Some(12));
        assert_eq!(result.match_type, MatchType::Hybrid);
        assert_eq!(result.highlights, vec!["Entry 101 talks about **combat**."]);
    }

    #[tokio::test]
    async fn test_highlights_are_bounded() {
        let mut store = FakeStore::with_entries(&[101]).lexical(&[(101, 1.0)]);
        store.bodies.insert(
            101,
            "Attack. Attack again. Attack thrice. Attack once more.".into(),
        );
        let response = engine(store, false)
            .search(&SearchRequest::new("attack", SearchMode::Fulltext))
            .await
            .unwrap();
        assert_eq!(response.results[0].highlights.len(), 3);
        assert!(response.results[0]
            .highlights
            .iter()
            .all(|h| h.contains("**Attack**")));
    }
}

//! Search request and response types.

use serde::{Deserialize, Serialize};

use grimoire_core::{Error, Result};

pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_QUERY_CHARS: usize = 500;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Which sub-searches a request runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// FTS5 only.
    Fulltext,
    /// Vector similarity only.
    Semantic,
    /// Both, fused with reciprocal rank fusion.
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fulltext => "fulltext",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fulltext" => Some(Self::Fulltext),
            "semantic" => Some(Self::Semantic),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Which sub-search(es) produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Fulltext,
    Semantic,
    /// Found by both.
    Hybrid,
}

/// A search request as received from callers. Use [`SearchRequest::validate`] before
/// running it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub document_id: Option<i64>,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            limit: DEFAULT_LIMIT,
            offset: 0,
            document_id: None,
        }
    }

    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_document(mut self, document_id: i64) -> Self {
        self.document_id = Some(document_id);
        self
    }

    /// Trim and length-check the query; clamp `limit` to 1..=100 and `offset` to >= 0.
    pub fn validate(&self) -> Result<SearchParams> {
        let query = self.query.trim();
        let chars = query.chars().count();
        if chars < MIN_QUERY_CHARS {
            return Err(Error::Validation(format!(
                "query must be at least {} characters",
                MIN_QUERY_CHARS
            )));
        }
        if chars > MAX_QUERY_CHARS {
            return Err(Error::Validation(format!(
                "query must be at most {} characters",
                MAX_QUERY_CHARS
            )));
        }
        Ok(SearchParams {
            query: query.to_string(),
            mode: self.mode,
            limit: self.limit.clamp(1, MAX_LIMIT) as usize,
            offset: self.offset.max(0) as usize,
            document_id: self.document_id,
        })
    }
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub mode: SearchMode,
    pub limit: usize,
    pub offset: usize,
    pub document_id: Option<i64>,
}

/// One ranked candidate before enrichment. `score` is the final relevance in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedEntry {
    pub entry_id: i64,
    pub score: f64,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub entry_id: i64,
    /// Entry title, falling back to the section title.
    pub title: String,
    pub content: String,
    pub section_title: String,
    pub chapter_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<i32>,
    pub chapter_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    pub document_id: i64,
    pub document_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,
    pub relevance: f64,
    pub match_type: MatchType,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Length of the full ranked list, not of this page.
    pub total: usize,
    pub query: String,
    pub mode: SearchMode,
}

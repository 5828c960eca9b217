//! Typed records for the rulebook corpus.

use serde::{Deserialize, Serialize};

/// Source file formats a Document can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Text,
    Markdown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Markdown => "markdown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "text" | "txt" => Some(Self::Text),
            "markdown" | "md" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Ingestion lifecycle of a Document. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rulebook source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub name: String,
    pub file_type: FileType,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i32>,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub file_type: FileType,
    pub content_hash: String,
    pub page_count: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub document_id: i64,
    pub title: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    pub order_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_start: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_end: Option<i32>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewChapter {
    pub title: String,
    pub slug: String,
    pub chapter_number: Option<i32>,
    pub part: Option<String>,
    pub order_index: i32,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: i64,
    pub chapter_id: i64,
    pub title: String,
    pub order_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_start: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_end: Option<i32>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewSection {
    pub title: String,
    pub order_index: i32,
    pub page_start: Option<i32>,
    pub page_end: Option<i32>,
    pub keywords: Vec<String>,
}

/// The unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: i64,
    pub section_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    pub order_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub title: Option<String>,
    pub body: String,
    pub order_index: i32,
    pub page: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A spell extracted from a "Spell Descriptions" section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellDefinition {
    pub name: String,
    pub source: String,
    /// 0 for cantrips.
    pub level: u8,
    pub school: String,
    pub ritual: bool,
    pub casting_time: Option<String>,
    pub range: Option<String>,
    pub components: Option<String>,
    pub duration: Option<String>,
    pub description: String,
    pub higher_levels: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

/// A monster stat block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterStats {
    pub name: String,
    pub source: String,
    pub size: String,
    pub monster_type: String,
    pub alignment: Option<String>,
    pub armor_class: i32,
    pub armor_note: Option<String>,
    pub hit_points: Option<i32>,
    pub hit_dice: Option<String>,
    pub speed: Option<String>,
    pub abilities: Option<AbilityScores>,
    pub challenge: Option<String>,
    pub senses: Option<String>,
    pub languages: Option<String>,
}

/// A chapter together with its sections, for document detail views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterOutline {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub sections: Vec<Section>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub documents: i64,
    pub completed_documents: i64,
    pub chapters: i64,
    pub sections: i64,
    pub entries: i64,
    pub embeddings_stored: i64,
    pub embedding_dimension: usize,
    pub categories: i64,
    pub spells: i64,
    pub monsters: i64,
    pub db_path: String,
    pub db_size_mb: f64,
    pub matrix_rows: usize,
}

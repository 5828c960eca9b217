//! Rulebook ingestion pipeline: text → parse → store.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::file;
use crate::keywords::extract_keywords;
use crate::parser::{parse_rulebook, ParsedChapter, ParsedRulebook};
use grimoire_core::{Error, Result};
use grimoire_store::{
    DocumentStatus, FileType, NewChapter, NewDocument, NewEntry, NewSection, SqliteStore,
};

/// Raw rulebook text plus the identifiers it is filed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Display name of the Document.
    pub name: String,
    pub text: String,
    /// Source tag for slugs, spells and monsters, e.g. `basic_rules`.
    pub source: String,
    #[serde(default = "default_file_type")]
    pub file_type: FileType,
}

fn default_file_type() -> FileType {
    FileType::Text
}

/// What one ingestion wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: i64,
    pub chapters: usize,
    pub sections: usize,
    pub entries: usize,
    pub spells: usize,
    pub monsters: usize,
}

/// Handles rulebook ingestion: duplicate check, parsing, and storage.
pub struct Ingester<'a> {
    store: &'a SqliteStore,
}

impl<'a> Ingester<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Ingest a rulebook file. Returns `None` if no text could be extracted.
    pub fn ingest_file(&self, path: &Path, source: &str) -> Result<Option<IngestReport>> {
        let (text, file_type) = match file::extract_text(path)? {
            Some((t, ft)) if !t.trim().is_empty() => (t, ft),
            _ => {
                debug!("No text extracted from {}", path.display());
                return Ok(None);
            }
        };

        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        self.ingest_text(&IngestRequest {
            name,
            text,
            source: source.to_string(),
            file_type,
        })
        .map(Some)
    }

    /// Parse and persist rulebook text as a new Document.
    ///
    /// The Document is `completed` only once every chapter, section, entry, spell and
    /// monster has been written. On a write failure it is marked `failed` with the error
    /// text and the partial tree is left in place.
    pub fn ingest_text(&self, request: &IngestRequest) -> Result<IngestReport> {
        if request.text.trim().is_empty() {
            return Err(Error::Validation("rulebook text is empty".into()));
        }
        if request.source.trim().is_empty() {
            return Err(Error::Validation("source must not be empty".into()));
        }

        let hash = content_hash(&request.text);
        if self.store.find_document_by_hash(&hash)?.is_some() {
            debug!("Duplicate content, skipping: {}", request.name);
            return Err(Error::DuplicateContent(hash));
        }

        let document_id = self.store.create_document(&NewDocument {
            name: request.name.clone(),
            file_type: request.file_type,
            content_hash: hash,
            page_count: None,
        })?;
        info!("Ingesting {} as document {}", request.name, document_id);

        let rulebook = parse_rulebook(&request.text, &request.source);
        match self.persist(document_id, &rulebook) {
            Ok(report) => {
                self.store
                    .set_document_status(document_id, DocumentStatus::Completed, None)?;
                info!(
                    "Ingested document {}: {} chapters, {} sections, {} entries, {} spells, {} monsters",
                    document_id,
                    report.chapters,
                    report.sections,
                    report.entries,
                    report.spells,
                    report.monsters
                );
                Ok(report)
            }
            Err(e) => {
                error!("Ingestion of document {} failed: {}", document_id, e);
                let message = e.to_string();
                if let Err(status_err) = self.store.set_document_status(
                    document_id,
                    DocumentStatus::Failed,
                    Some(&message),
                ) {
                    error!(
                        "Could not mark document {} as failed: {}",
                        document_id, status_err
                    );
                }
                Err(e)
            }
        }
    }

    fn persist(&self, document_id: i64, rulebook: &ParsedRulebook) -> Result<IngestReport> {
        let mut report = IngestReport {
            document_id,
            ..Default::default()
        };

        for chapter in &rulebook.chapters {
            self.persist_chapter(document_id, chapter, &mut report)?;
        }
        for spell in &rulebook.spells {
            self.store.upsert_spell(spell)?;
            report.spells += 1;
        }
        for monster in &rulebook.monsters {
            self.store.upsert_monster(monster)?;
            report.monsters += 1;
        }
        Ok(report)
    }

    /// A chapter's own body becomes a section named after the chapter at order 0;
    /// parsed sections follow from order 1.
    fn persist_chapter(
        &self,
        document_id: i64,
        chapter: &ParsedChapter,
        report: &mut IngestReport,
    ) -> Result<()> {
        let chapter_id = self.store.add_chapter(
            document_id,
            &NewChapter {
                title: chapter.title.clone(),
                slug: chapter.slug.clone(),
                chapter_number: Some(chapter.chapter_number),
                part: chapter.part.clone(),
                order_index: chapter.order_index,
                keywords: chapter.keywords.clone(),
                ..Default::default()
            },
        )?;
        report.chapters += 1;

        if !chapter.body.trim().is_empty() {
            let keywords = extract_keywords(&format!("{} {}", chapter.title, chapter.body));
            self.persist_section(chapter_id, &chapter.title, 0, &chapter.body, keywords, report)?;
        }
        for section in &chapter.sections {
            self.persist_section(
                chapter_id,
                &section.title,
                section.order_index + 1,
                &section.body,
                section.keywords.clone(),
                report,
            )?;
        }
        Ok(())
    }

    fn persist_section(
        &self,
        chapter_id: i64,
        title: &str,
        order_index: i32,
        body: &str,
        keywords: Vec<String>,
        report: &mut IngestReport,
    ) -> Result<()> {
        let section_id = self.store.add_section(
            chapter_id,
            &NewSection {
                title: title.to_string(),
                order_index,
                keywords,
                ..Default::default()
            },
        )?;
        report.sections += 1;

        for (i, paragraph) in split_entries(body).enumerate() {
            self.store.add_entry(
                section_id,
                &NewEntry {
                    title: Some(title.to_string()),
                    body: paragraph.to_string(),
                    order_index: i as i32,
                    page: None,
                },
            )?;
            report.entries += 1;
        }
        Ok(())
    }
}

/// Paragraphs of a section body, one per Entry.
pub fn split_entries(body: &str) -> impl Iterator<Item = &str> {
    body.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

/// Compute SHA-256 content hash.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

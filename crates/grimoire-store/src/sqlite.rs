//! SQLite corpus store with FTS5 lexical search and int8 vector search.
//!
//! One database file holds the rulebook hierarchy (documents → chapters → sections →
//! entries), the quantized entry embeddings, and the extracted spell/monster records.
//! Only entries of `completed` documents are ever visible to search.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::corpus::{CorpusStore, EntryContext, ScoredEntry};
use crate::embedding::{dequantize_uint8, normalize, quantize_uint8};
use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, REFERENCE_SCHEMA_SQL, SCHEMA_SQL};
use crate::types::*;
use grimoire_core::{Error, Result};

/// SQLite store for the rulebook corpus.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    embedding_dim: usize,
    /// Pre-loaded normalized embeddings of searchable entries.
    embedding_matrix: Mutex<EmbeddingMatrix>,
}

struct EmbeddingMatrix {
    /// Normalized embeddings, shape (N, dim).
    matrix: Array2<f32>,
    /// Entry ID of each row.
    entry_ids: Vec<i64>,
    /// Owning document of each row, for document-scoped queries.
    document_ids: Vec<i64>,
    /// Set whenever embeddings or document visibility change.
    dirty: bool,
    /// Bumped by every invalidation; a reload only clears `dirty` if none arrived
    /// while it was reading.
    generation: u64,
}

/// Matrix contents read from the database, not yet installed.
struct LoadedMatrix {
    matrix: Array2<f32>,
    entry_ids: Vec<i64>,
    document_ids: Vec<i64>,
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    e.to_string().contains("UNIQUE constraint")
}

fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    e.to_string().contains("FOREIGN KEY")
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteStore {
    /// Open or create the store. The database file is `db_dir/grimoire.db`.
    pub fn open(db_dir: impl AsRef<Path>, embedding_dim: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("grimoire.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
            embedding_dim,
            embedding_matrix: Mutex::new(EmbeddingMatrix {
                matrix: Array2::zeros((0, embedding_dim)),
                entry_ids: Vec::new(),
                document_ids: Vec::new(),
                dirty: true,
                generation: 0,
            }),
        };

        store.load_embedding_matrix()?;

        let stats = store.get_stats()?;
        info!(
            "SqliteStore initialized: {} documents, {} entries, {} embeddings, dim={}, path={}",
            stats.documents,
            stats.entries,
            stats.embeddings_stored,
            embedding_dim,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -65536;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!(
            "{}\n{}\n{}\n{}",
            SCHEMA_SQL, REFERENCE_SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL
        );
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn mark_matrix_dirty(&self) {
        let mut mat = self.embedding_matrix.lock();
        mat.dirty = true;
        mat.generation = mat.generation.wrapping_add(1);
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    /// Insert a document in `processing` state. Returns the new document ID.
    pub fn create_document(&self, doc: &NewDocument) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO documents (name, file_type, content_hash, page_count, status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, 'processing', ?5)",
            )
            .map_err(db_err)?
            .insert(params![
                doc.name,
                doc.file_type.as_str(),
                doc.content_hash,
                doc.page_count,
                now_millis()
            ])
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateContent(doc.content_hash.clone())
                } else {
                    db_err(e)
                }
            })?;
        debug!("Created document {} ({})", id, doc.name);
        Ok(id)
    }

    /// Find a document by content hash.
    pub fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let result = conn.prepare_cached("SELECT * FROM documents WHERE content_hash = ?1")
            .map_err(db_err)?
            .query_row(params![content_hash], Self::row_to_document)
            .optional()
            .map_err(db_err);
        result
    }

    pub fn get_document(&self, doc_id: i64) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        Self::query_document(&conn, doc_id)
    }

    /// All documents, newest first.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM documents ORDER BY created_at DESC, id DESC")
            .map_err(db_err)?;
        let rows = stmt.query_map([], Self::row_to_document).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Move a `processing` document to a new status. `error_log` is recorded for failures.
    ///
    /// `completed` and `failed` are terminal: changing them is a `Validation` error.
    pub fn set_document_status(
        &self,
        doc_id: i64,
        status: DocumentStatus,
        error_log: Option<&str>,
    ) -> Result<()> {
        {
            let conn = self.conn.lock();
            let updated = conn
                .execute(
                    "UPDATE documents SET status = ?1, error_log = ?2, updated_at = ?3 \
                     WHERE id = ?4 AND status = 'processing'",
                    params![status.as_str(), error_log, now_millis(), doc_id],
                )
                .map_err(db_err)?;
            if updated == 0 {
                return Err(match Self::query_document(&conn, doc_id)? {
                    Some(doc) => Error::Validation(format!(
                        "document {} is already {} and cannot become {}",
                        doc_id, doc.status, status
                    )),
                    None => Error::NotFound(format!("document {}", doc_id)),
                });
            }
        }
        self.mark_matrix_dirty();
        debug!("Document {} is now {}", doc_id, status);
        Ok(())
    }

    /// Delete a document and, by cascade, its whole hierarchy and embeddings.
    pub fn delete_document(&self, doc_id: i64) -> Result<bool> {
        let deleted = {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM documents WHERE id = ?1", params![doc_id])
                .map_err(db_err)?
        };
        if deleted > 0 {
            self.mark_matrix_dirty();
            info!("Deleted document {}", doc_id);
        }
        Ok(deleted > 0)
    }

    /// Chapters of a document with their sections, in reading order.
    pub fn document_outline(&self, doc_id: i64) -> Result<Vec<ChapterOutline>> {
        let chapters = self.get_chapters(doc_id)?;
        chapters
            .into_iter()
            .map(|chapter| {
                let sections = self.get_sections(chapter.id)?;
                Ok(ChapterOutline { chapter, sections })
            })
            .collect()
    }

    // ---------------------------------------------------------------
    // Hierarchy
    // ---------------------------------------------------------------

    pub fn add_chapter(&self, document_id: i64, chapter: &NewChapter) -> Result<i64> {
        let keywords_json = serde_json::to_string(&chapter.keywords)?;
        let conn = self.conn.lock();
        let result = conn.prepare_cached(
            "INSERT INTO chapters (document_id, title, slug, chapter_number, part, order_index, \
             page_start, page_end, keywords_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .map_err(db_err)?
        .insert(params![
            document_id,
            chapter.title,
            chapter.slug,
            chapter.chapter_number,
            chapter.part,
            chapter.order_index,
            chapter.page_start,
            chapter.page_end,
            keywords_json
        ])
        .map_err(db_err);
        result
    }

    pub fn add_section(&self, chapter_id: i64, section: &NewSection) -> Result<i64> {
        let keywords_json = serde_json::to_string(&section.keywords)?;
        let conn = self.conn.lock();
        let result = conn.prepare_cached(
            "INSERT INTO sections (chapter_id, title, order_index, page_start, page_end, keywords_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(db_err)?
        .insert(params![
            chapter_id,
            section.title,
            section.order_index,
            section.page_start,
            section.page_end,
            keywords_json
        ])
        .map_err(db_err);
        result
    }

    /// Insert an entry. Entries with a blank body are rejected.
    pub fn add_entry(&self, section_id: i64, entry: &NewEntry) -> Result<i64> {
        if entry.body.trim().is_empty() {
            return Err(Error::Validation("entry body must not be empty".into()));
        }
        let conn = self.conn.lock();
        let result = conn.prepare_cached(
            "INSERT INTO entries (section_id, title, body, order_index, page) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(db_err)?
        .insert(params![
            section_id,
            entry.title,
            entry.body,
            entry.order_index,
            entry.page
        ])
        .map_err(db_err);
        result
    }

    pub fn get_chapters(&self, doc_id: i64) -> Result<Vec<Chapter>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM chapters WHERE document_id = ?1 ORDER BY order_index")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![doc_id], Self::row_to_chapter)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn get_sections(&self, chapter_id: i64) -> Result<Vec<Section>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM sections WHERE chapter_id = ?1 ORDER BY order_index")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![chapter_id], Self::row_to_section)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn get_entries(&self, section_id: i64) -> Result<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM entries WHERE section_id = ?1 ORDER BY order_index")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![section_id], Self::row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn get_entry(&self, entry_id: i64) -> Result<Option<Entry>> {
        let conn = self.conn.lock();
        Self::query_entry(&conn, entry_id)
    }

    /// Every entry of a document, in reading order.
    pub fn entries_for_document(&self, doc_id: i64) -> Result<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT e.* FROM entries e \
                 JOIN sections s ON s.id = e.section_id \
                 JOIN chapters c ON c.id = s.chapter_id \
                 WHERE c.document_id = ?1 \
                 ORDER BY c.order_index, s.order_index, e.order_index",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![doc_id], Self::row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Embeddings
    // ---------------------------------------------------------------

    /// Store (or replace) an entry's embedding. The vector length must match the
    /// store's configured dimension.
    pub fn set_entry_embedding(&self, entry_id: i64, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.embedding_dim {
            return Err(Error::Validation(format!(
                "embedding has dimension {}, expected {}",
                embedding.len(),
                self.embedding_dim
            )));
        }
        let (bytes, scale, offset) = quantize_uint8(embedding);
        {
            let conn = self.conn.lock();
            conn.prepare_cached(
                "INSERT OR REPLACE INTO entry_embeddings (entry_id, embedding, dimension, scale, offset_val) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(db_err)?
            .execute(params![
                entry_id,
                bytes,
                self.embedding_dim as i64,
                scale as f64,
                offset as f64
            ])
            .map_err(db_err)?;
        }
        self.mark_matrix_dirty();
        Ok(())
    }

    /// Entries of completed documents with an id above `after_id` that have no embedding
    /// yet, in id order.
    pub fn entries_without_embedding(&self, after_id: i64, limit: usize) -> Result<Vec<Entry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT e.* FROM entries e \
                 JOIN sections s ON s.id = e.section_id \
                 JOIN chapters c ON c.id = s.chapter_id \
                 JOIN documents d ON d.id = c.document_id \
                 LEFT JOIN entry_embeddings ee ON ee.entry_id = e.id \
                 WHERE ee.entry_id IS NULL AND d.status = 'completed' AND e.id > ?1 \
                 ORDER BY e.id LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![after_id, limit as i64], Self::row_to_entry)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Load and normalize the embeddings of searchable entries into a matrix.
    fn load_embedding_matrix(&self) -> Result<()> {
        let generation = self.embedding_matrix.lock().generation;
        let loaded = self.read_embedding_matrix()?;
        self.install_matrix(generation, loaded);
        Ok(())
    }

    fn read_embedding_matrix(&self) -> Result<LoadedMatrix> {
        let mut entry_ids = Vec::new();
        let mut document_ids = Vec::new();
        let mut rows_data: Vec<Array1<f32>> = Vec::new();

        {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare_cached(
                    "SELECT ee.entry_id, c.document_id, ee.embedding, ee.scale, ee.offset_val \
                     FROM entry_embeddings ee \
                     JOIN entries e ON e.id = ee.entry_id \
                     JOIN sections s ON s.id = e.section_id \
                     JOIN chapters c ON c.id = s.chapter_id \
                     JOIN documents d ON d.id = c.document_id \
                     WHERE d.status = 'completed' AND ee.dimension = ?1 \
                     ORDER BY ee.entry_id",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![self.embedding_dim as i64], |row| {
                    let entry_id: i64 = row.get(0)?;
                    let document_id: i64 = row.get(1)?;
                    let blob: Vec<u8> = row.get(2)?;
                    let scale: f64 = row.get(3)?;
                    let offset: f64 = row.get(4)?;
                    Ok((entry_id, document_id, blob, scale as f32, offset as f32))
                })
                .map_err(db_err)?;

            for row in rows {
                let (entry_id, document_id, blob, scale, offset) = row.map_err(db_err)?;
                if blob.len() != self.embedding_dim {
                    continue;
                }
                // Zero vectors have no direction and can never match.
                if let Some(unit) = normalize(dequantize_uint8(&blob, scale, offset)) {
                    entry_ids.push(entry_id);
                    document_ids.push(document_id);
                    rows_data.push(unit);
                }
            }
        }

        let mut matrix = Array2::zeros((rows_data.len(), self.embedding_dim));
        for (i, row) in rows_data.iter().enumerate() {
            matrix.row_mut(i).assign(row);
        }

        Ok(LoadedMatrix {
            matrix,
            entry_ids,
            document_ids,
        })
    }

    /// Publish a matrix read at `generation`. Writes committed since then leave it dirty.
    fn install_matrix(&self, generation: u64, loaded: LoadedMatrix) {
        let mut mat = self.embedding_matrix.lock();
        mat.matrix = loaded.matrix;
        mat.entry_ids = loaded.entry_ids;
        mat.document_ids = loaded.document_ids;
        mat.dirty = mat.generation != generation;
        debug!("Loaded {} embeddings into matrix", mat.entry_ids.len());
    }

    fn ensure_matrix_loaded(&self) -> Result<()> {
        if self.embedding_matrix.lock().dirty {
            self.load_embedding_matrix()?;
        }
        Ok(())
    }

    /// Sanitize a user query for FTS5 MATCH syntax.
    /// Wraps each token in double quotes and joins with OR.
    fn sanitize_fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|t| t.replace('"', ""))
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    // ---------------------------------------------------------------
    // Categories
    // ---------------------------------------------------------------

    pub fn create_category(
        &self,
        name: &str,
        parent_id: Option<i64>,
        description: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        let result = conn.prepare_cached(
            "INSERT INTO categories (name, parent_id, description) VALUES (?1, ?2, ?3)",
        )
        .map_err(db_err)?
        .insert(params![name, parent_id, description])
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::DuplicateCategory(name.to_string())
            } else if is_foreign_key_violation(&e) {
                Error::NotFound(format!("parent category {}", parent_id.unwrap_or_default()))
            } else {
                db_err(e)
            }
        });
        result
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM categories ORDER BY name")
            .map_err(db_err)?;
        let rows = stmt.query_map([], Self::row_to_category).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Tag an entry with a category. Re-tagging is a no-op.
    pub fn tag_entry(&self, entry_id: i64, category_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO entry_categories (entry_id, category_id) VALUES (?1, ?2)",
            params![entry_id, category_id],
        )
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::NotFound(format!("entry {} or category {}", entry_id, category_id))
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    pub fn categories_for_entry(&self, entry_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.* FROM categories c \
                 JOIN entry_categories ec ON ec.category_id = c.id \
                 WHERE ec.entry_id = ?1 ORDER BY c.name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![entry_id], Self::row_to_category)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Spells and monsters
    // ---------------------------------------------------------------

    /// Insert a spell, replacing any previous definition with the same name and source.
    pub fn upsert_spell(&self, spell: &SpellDefinition) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO spells (name, source, level, school, ritual, casting_time, range, \
             components, duration, description, higher_levels) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
             ON CONFLICT(name, source) DO UPDATE SET \
             level = excluded.level, school = excluded.school, ritual = excluded.ritual, \
             casting_time = excluded.casting_time, range = excluded.range, \
             components = excluded.components, duration = excluded.duration, \
             description = excluded.description, higher_levels = excluded.higher_levels",
        )
        .map_err(db_err)?
        .execute(params![
            spell.name,
            spell.source,
            spell.level,
            spell.school,
            spell.ritual,
            spell.casting_time,
            spell.range,
            spell.components,
            spell.duration,
            spell.description,
            spell.higher_levels
        ])
        .map_err(db_err)?;
        Ok(())
    }

    /// Look a spell up by name, ignoring case.
    pub fn get_spell(&self, name: &str) -> Result<Option<SpellDefinition>> {
        let conn = self.conn.lock();
        let result = conn.prepare_cached(
            "SELECT * FROM spells WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
        )
        .map_err(db_err)?
        .query_row(params![name.trim()], Self::row_to_spell)
        .optional()
        .map_err(db_err);
        result
    }

    /// Spells ordered by level then name, optionally restricted to one source.
    pub fn list_spells(&self, source: Option<&str>) -> Result<Vec<SpellDefinition>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT * FROM spells WHERE (?1 IS NULL OR source = ?1) ORDER BY level, name",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![source], Self::row_to_spell)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn upsert_monster(&self, monster: &MonsterStats) -> Result<()> {
        let abilities_json = monster
            .abilities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO monsters (name, source, size, monster_type, alignment, armor_class, \
             armor_note, hit_points, hit_dice, speed, abilities_json, challenge, senses, languages) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
             ON CONFLICT(name, source) DO UPDATE SET \
             size = excluded.size, monster_type = excluded.monster_type, \
             alignment = excluded.alignment, armor_class = excluded.armor_class, \
             armor_note = excluded.armor_note, hit_points = excluded.hit_points, \
             hit_dice = excluded.hit_dice, speed = excluded.speed, \
             abilities_json = excluded.abilities_json, challenge = excluded.challenge, \
             senses = excluded.senses, languages = excluded.languages",
        )
        .map_err(db_err)?
        .execute(params![
            monster.name,
            monster.source,
            monster.size,
            monster.monster_type,
            monster.alignment,
            monster.armor_class,
            monster.armor_note,
            monster.hit_points,
            monster.hit_dice,
            monster.speed,
            abilities_json,
            monster.challenge,
            monster.senses,
            monster.languages
        ])
        .map_err(db_err)?;
        Ok(())
    }

    /// Look a monster up by name, ignoring case.
    pub fn get_monster(&self, name: &str) -> Result<Option<MonsterStats>> {
        let conn = self.conn.lock();
        let result = conn.prepare_cached(
            "SELECT * FROM monsters WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
        )
        .map_err(db_err)?
        .query_row(params![name.trim()], Self::row_to_monster)
        .optional()
        .map_err(db_err);
        result
    }

    pub fn list_monsters(&self, source: Option<&str>) -> Result<Vec<MonsterStats>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM monsters WHERE (?1 IS NULL OR source = ?1) ORDER BY name")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![source], Self::row_to_monster)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    fn count(&self, sql: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(sql, [], |row| row.get(0)).map_err(db_err)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let matrix_rows = self.embedding_matrix.lock().entry_ids.len();

        Ok(StoreStats {
            documents: self.count("SELECT COUNT(*) FROM documents")?,
            completed_documents: self
                .count("SELECT COUNT(*) FROM documents WHERE status = 'completed'")?,
            chapters: self.count("SELECT COUNT(*) FROM chapters")?,
            sections: self.count("SELECT COUNT(*) FROM sections")?,
            entries: self.count("SELECT COUNT(*) FROM entries")?,
            embeddings_stored: self.count("SELECT COUNT(*) FROM entry_embeddings")?,
            embedding_dimension: self.embedding_dim,
            categories: self.count("SELECT COUNT(*) FROM categories")?,
            spells: self.count("SELECT COUNT(*) FROM spells")?,
            monsters: self.count("SELECT COUNT(*) FROM monsters")?,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
            matrix_rows,
        })
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn query_document(conn: &Connection, doc_id: i64) -> Result<Option<Document>> {
        conn.prepare_cached("SELECT * FROM documents WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![doc_id], Self::row_to_document)
            .optional()
            .map_err(db_err)
    }

    fn query_chapter(conn: &Connection, chapter_id: i64) -> Result<Option<Chapter>> {
        conn.prepare_cached("SELECT * FROM chapters WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![chapter_id], Self::row_to_chapter)
            .optional()
            .map_err(db_err)
    }

    fn query_section(conn: &Connection, section_id: i64) -> Result<Option<Section>> {
        conn.prepare_cached("SELECT * FROM sections WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![section_id], Self::row_to_section)
            .optional()
            .map_err(db_err)
    }

    fn query_entry(conn: &Connection, entry_id: i64) -> Result<Option<Entry>> {
        conn.prepare_cached("SELECT * FROM entries WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![entry_id], Self::row_to_entry)
            .optional()
            .map_err(db_err)
    }

    fn parse_keywords(raw: Option<String>) -> Vec<String> {
        raw.and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        let file_type: String = row.get("file_type")?;
        let status: String = row.get("status")?;
        Ok(Document {
            id: row.get("id")?,
            name: row.get("name")?,
            file_type: FileType::parse(&file_type).unwrap_or(FileType::Text),
            content_hash: row.get("content_hash")?,
            page_count: row.get("page_count")?,
            status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
            error_log: row.get("error_log")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            title: row.get("title")?,
            slug: row.get("slug")?,
            chapter_number: row.get("chapter_number")?,
            part: row.get("part")?,
            order_index: row.get("order_index")?,
            page_start: row.get("page_start")?,
            page_end: row.get("page_end")?,
            keywords: Self::parse_keywords(row.get("keywords_json")?),
        })
    }

    fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<Section> {
        Ok(Section {
            id: row.get("id")?,
            chapter_id: row.get("chapter_id")?,
            title: row.get("title")?,
            order_index: row.get("order_index")?,
            page_start: row.get("page_start")?,
            page_end: row.get("page_end")?,
            keywords: Self::parse_keywords(row.get("keywords_json")?),
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
        Ok(Entry {
            id: row.get("id")?,
            section_id: row.get("section_id")?,
            title: row.get("title")?,
            body: row.get("body")?,
            order_index: row.get("order_index")?,
            page: row.get("page")?,
        })
    }

    fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
            parent_id: row.get("parent_id")?,
            description: row.get("description")?,
        })
    }

    fn row_to_spell(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpellDefinition> {
        Ok(SpellDefinition {
            name: row.get("name")?,
            source: row.get("source")?,
            level: row.get("level")?,
            school: row.get("school")?,
            ritual: row.get("ritual")?,
            casting_time: row.get("casting_time")?,
            range: row.get("range")?,
            components: row.get("components")?,
            duration: row.get("duration")?,
            description: row.get("description")?,
            higher_levels: row.get("higher_levels")?,
        })
    }

    fn row_to_monster(row: &rusqlite::Row<'_>) -> rusqlite::Result<MonsterStats> {
        let abilities: Option<String> = row.get("abilities_json")?;
        Ok(MonsterStats {
            name: row.get("name")?,
            source: row.get("source")?,
            size: row.get("size")?,
            monster_type: row.get("monster_type")?,
            alignment: row.get("alignment")?,
            armor_class: row.get("armor_class")?,
            armor_note: row.get("armor_note")?,
            hit_points: row.get("hit_points")?,
            hit_dice: row.get("hit_dice")?,
            speed: row.get("speed")?,
            abilities: abilities.and_then(|s| serde_json::from_str(&s).ok()),
            challenge: row.get("challenge")?,
            senses: row.get("senses")?,
            languages: row.get("languages")?,
        })
    }
}

impl CorpusStore for SqliteStore {
    /// FTS5 BM25 search. FTS5 rank is negative; it is negated so higher is better.
    fn lexical_search(
        &self,
        query: &str,
        limit: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<ScoredEntry>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT e.id AS entry_id, entries_fts.rank AS bm25_score \
                 FROM entries_fts \
                 JOIN entries e ON e.id = entries_fts.rowid \
                 JOIN sections s ON s.id = e.section_id \
                 JOIN chapters c ON c.id = s.chapter_id \
                 JOIN documents d ON d.id = c.document_id \
                 WHERE entries_fts MATCH ?1 \
                   AND d.status = 'completed' \
                   AND (?2 IS NULL OR d.id = ?2) \
                 ORDER BY entries_fts.rank, e.id \
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![fts_query, document_id, limit as i64], |row| {
                let bm25_score: f64 = row.get("bm25_score")?;
                Ok(ScoredEntry {
                    entry_id: row.get("entry_id")?,
                    score: -bm25_score,
                })
            })
            .map_err(db_err)?;
        let hits = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)?;
        debug!("Lexical search {:?}: {} hits", fts_query, hits.len());
        Ok(hits)
    }

    /// Cosine similarity search over the pre-loaded normalized matrix.
    fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<ScoredEntry>> {
        if query_embedding.len() != self.embedding_dim {
            return Err(Error::Validation(format!(
                "query embedding has dimension {}, expected {}",
                query_embedding.len(),
                self.embedding_dim
            )));
        }
        self.ensure_matrix_loaded()?;

        let Some(q) = normalize(Array1::from_vec(query_embedding.to_vec())) else {
            return Ok(Vec::new());
        };

        let mat = self.embedding_matrix.lock();
        if mat.entry_ids.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // (N, dim) @ (dim,) → (N,)
        let similarities = mat.matrix.dot(&q);

        let mut scored: Vec<ScoredEntry> = similarities
            .iter()
            .enumerate()
            .filter(|(i, _)| document_id.map_or(true, |d| mat.document_ids[*i] == d))
            .map(|(i, &s)| ScoredEntry {
                entry_id: mat.entry_ids[i],
                score: (s as f64).clamp(0.0, 1.0),
            })
            .collect();
        drop(mat);

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entry_id.cmp(&b.entry_id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    fn fetch_entries_with_context(&self, entry_ids: &[i64]) -> Result<Vec<EntryContext>> {
        let conn = self.conn.lock();
        let mut sections: HashMap<i64, Option<Section>> = HashMap::new();
        let mut chapters: HashMap<i64, Option<Chapter>> = HashMap::new();
        let mut documents: HashMap<i64, Option<Document>> = HashMap::new();
        let mut out = Vec::with_capacity(entry_ids.len());

        for &entry_id in entry_ids {
            let Some(entry) = Self::query_entry(&conn, entry_id)? else {
                continue;
            };
            let section = match sections.get(&entry.section_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = Self::query_section(&conn, entry.section_id)?;
                    sections.insert(entry.section_id, found.clone());
                    found
                }
            };
            let Some(section) = section else { continue };
            let chapter = match chapters.get(&section.chapter_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = Self::query_chapter(&conn, section.chapter_id)?;
                    chapters.insert(section.chapter_id, found.clone());
                    found
                }
            };
            let Some(chapter) = chapter else { continue };
            let document = match documents.get(&chapter.document_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = Self::query_document(&conn, chapter.document_id)?;
                    documents.insert(chapter.document_id, found.clone());
                    found
                }
            };
            let Some(document) = document else { continue };

            out.push(EntryContext {
                entry,
                section,
                chapter,
                document,
            });
        }
        Ok(out)
    }
}

//! Database schema SQL for the rulebook corpus.

/// Hierarchy tables: documents → chapters → sections → entries.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    file_type TEXT NOT NULL,
    content_hash TEXT NOT NULL UNIQUE,
    page_count INTEGER,
    status TEXT NOT NULL DEFAULT 'processing',
    error_log TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);

CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    chapter_number INTEGER,
    part TEXT,
    order_index INTEGER NOT NULL,
    page_start INTEGER,
    page_end INTEGER,
    keywords_json TEXT NOT NULL DEFAULT '[]',
    UNIQUE (document_id, order_index),
    UNIQUE (document_id, slug)
);

CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chapter_id INTEGER NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    page_start INTEGER,
    page_end INTEGER,
    keywords_json TEXT NOT NULL DEFAULT '[]',
    UNIQUE (chapter_id, order_index)
);

CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    section_id INTEGER NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
    title TEXT,
    body TEXT NOT NULL CHECK (length(trim(body)) > 0),
    order_index INTEGER NOT NULL,
    page INTEGER,
    UNIQUE (section_id, order_index)
);

CREATE INDEX IF NOT EXISTS idx_chapters_document ON chapters(document_id);
CREATE INDEX IF NOT EXISTS idx_sections_chapter ON sections(chapter_id);
CREATE INDEX IF NOT EXISTS idx_entries_section ON entries(section_id);
CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);

CREATE TABLE IF NOT EXISTS entry_embeddings (
    entry_id INTEGER PRIMARY KEY REFERENCES entries(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimension INTEGER NOT NULL,
    scale REAL NOT NULL,
    offset_val REAL NOT NULL
);
"#;

/// Cross-cutting tags and the extracted spell/monster records.
pub const REFERENCE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS entry_categories (
    entry_id INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    PRIMARY KEY (entry_id, category_id)
);

CREATE TABLE IF NOT EXISTS spells (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    source TEXT NOT NULL,
    level INTEGER NOT NULL,
    school TEXT NOT NULL,
    ritual INTEGER NOT NULL DEFAULT 0,
    casting_time TEXT,
    range TEXT,
    components TEXT,
    duration TEXT,
    description TEXT NOT NULL,
    higher_levels TEXT,
    UNIQUE (name, source)
);

CREATE TABLE IF NOT EXISTS monsters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    source TEXT NOT NULL,
    size TEXT NOT NULL,
    monster_type TEXT NOT NULL,
    alignment TEXT,
    armor_class INTEGER NOT NULL,
    armor_note TEXT,
    hit_points INTEGER,
    hit_dice TEXT,
    speed TEXT,
    abilities_json TEXT,
    challenge TEXT,
    senses TEXT,
    languages TEXT,
    UNIQUE (name, source)
);

CREATE INDEX IF NOT EXISTS idx_spells_name ON spells(name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_monsters_name ON monsters(name COLLATE NOCASE);
"#;

/// FTS5 virtual table for full-text search over entries.
pub const FTS_SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
    title, body,
    content='entries', content_rowid='id',
    tokenize='porter unicode61'
);
"#;

/// Triggers to keep FTS index in sync with entries table.
pub const FTS_TRIGGERS_SQL: &str = r#"
CREATE TRIGGER IF NOT EXISTS entries_ai AFTER INSERT ON entries BEGIN
    INSERT INTO entries_fts(rowid, title, body)
    VALUES (new.id, COALESCE(new.title, ''), new.body);
END;

CREATE TRIGGER IF NOT EXISTS entries_ad AFTER DELETE ON entries BEGIN
    INSERT INTO entries_fts(entries_fts, rowid, title, body)
    VALUES ('delete', old.id, COALESCE(old.title, ''), old.body);
END;

CREATE TRIGGER IF NOT EXISTS entries_au AFTER UPDATE ON entries BEGIN
    INSERT INTO entries_fts(entries_fts, rowid, title, body)
    VALUES ('delete', old.id, COALESCE(old.title, ''), old.body);
    INSERT INTO entries_fts(rowid, title, body)
    VALUES (new.id, COALESCE(new.title, ''), new.body);
END;
"#;

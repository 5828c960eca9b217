//! Grimoire Ingest: rulebook grammar, keyword extraction, spell/monster extraction,
//! and the ingestion pipeline into the corpus store.

pub mod fields;
pub mod file;
pub mod ingest;
pub mod keywords;
pub mod monsters;
pub mod parser;
pub mod slug;
pub mod spells;

pub use fields::{MonsterField, SpellField};
pub use ingest::{content_hash, IngestReport, IngestRequest, Ingester};
pub use keywords::extract_keywords;
pub use monsters::parse_monsters;
pub use parser::{parse_rulebook, parse_rules, ParsedChapter, ParsedRulebook, ParsedSection};
pub use slug::slugify;
pub use spells::parse_spells;

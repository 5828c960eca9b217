//! Grimoire Store: SQLite FTS5 + int8 vector search over the rulebook hierarchy.

pub mod corpus;
pub mod embedding;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use corpus::{CorpusStore, EntryContext, ScoredEntry};
pub use sqlite::SqliteStore;
pub use types::*;

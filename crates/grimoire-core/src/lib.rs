//! Grimoire Core: error taxonomy and configuration shared by every crate.

pub mod config;
pub mod error;

pub use config::{DataPaths, EmbeddingSettings, GrimoireConfig, SearchSettings};
pub use error::{Error, Result};

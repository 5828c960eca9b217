//! Rulebook text extraction from files on disk.

use std::path::Path;

use grimoire_core::{Error, Result};
use grimoire_store::FileType;

/// Detect the rulebook file type from a path's extension.
pub fn detect_file_type(path: &Path) -> Option<FileType> {
    let ext = path.extension().and_then(|e| e.to_str())?;
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" => Some(FileType::Text),
        "md" | "markdown" => Some(FileType::Markdown),
        "pdf" => Some(FileType::Pdf),
        _ => None,
    }
}

/// Extract text content from a rulebook file.
///
/// Returns `Ok(None)` when the format has no text extractor.
pub fn extract_text(path: &Path) -> Result<Option<(String, FileType)>> {
    let file_type = detect_file_type(path).ok_or_else(|| {
        Error::Ingest(format!("Unsupported rulebook file: {}", path.display()))
    })?;

    match file_type {
        FileType::Text | FileType::Markdown => {
            let content = std::fs::read_to_string(path)?;
            Ok(Some((content, file_type)))
        }
        FileType::Pdf => {
            tracing::warn!("PDF text extraction is not supported: {}", path.display());
            Ok(None)
        }
    }
}

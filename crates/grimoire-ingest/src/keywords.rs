//! Frequency-based keyword extraction for chapters and sections.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Maximum keywords returned per text.
pub const MAX_KEYWORDS: usize = 20;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her",
        "was", "one", "our", "out", "has", "his", "how", "its", "may", "new", "now", "own",
        "say", "she", "too", "use", "who", "why", "did", "get", "him", "let", "per", "via",
        "this", "that", "with", "from", "they", "them", "then", "than", "their", "there",
        "these", "those", "what", "when", "where", "which", "while", "will", "would",
        "could", "should", "have", "been", "being", "were", "into", "onto", "your", "also",
        "each", "such", "only", "other", "some", "more", "most", "does", "just", "over",
    ]
    .into_iter()
    .collect()
});

/// Extract up to [`MAX_KEYWORDS`] keywords, most frequent first.
///
/// Tokens are lowercased ASCII-alphanumeric runs longer than two characters that are
/// not stop words. Equal counts keep first-occurrence order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in normalized.split_whitespace() {
        if token.len() <= 2 || STOP_WORDS.contains(token) {
            continue;
        }
        let count = counts.entry(token).or_insert(0);
        if *count == 0 {
            order.push(token);
        }
        *count += 1;
    }

    // Stable sort: ties stay in first-occurrence order.
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

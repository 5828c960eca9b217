//! Query-term snippets for search results.

pub const MAX_HIGHLIGHTS: usize = 3;
pub const SNIPPET_CHARS: usize = 200;
const MIN_TOKEN_CHARS: usize = 3;
const ELLIPSIS: &str = "...";

/// Lowercased query tokens longer than two characters, deduplicated in query order.
pub fn query_tokens(query: &str) -> Vec<String> {
    let normalized: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<String> = Vec::new();
    for word in normalized.split_whitespace() {
        let word = word.to_lowercase();
        if word.chars().count() >= MIN_TOKEN_CHARS && !tokens.contains(&word) {
            tokens.push(word);
        }
    }
    tokens
}

/// Up to three snippets of `body` containing a query token, with every token occurrence
/// wrapped in `**`.
///
/// Sentences (split on `.`, `!`, `?`) longer than the snippet width are cut to a window
/// centred on the first match, with `...` marking the cut sides.
pub fn highlight(body: &str, tokens: &[String]) -> Vec<String> {
    let patterns: Vec<Vec<char>> = {
        let mut p: Vec<Vec<char>> = tokens
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| t.chars().collect())
            .collect();
        // Longest first so "attacks" wins over "attack".
        p.sort_by(|a, b| b.len().cmp(&a.len()));
        p
    };
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    for sentence in sentences(body) {
        let chars: Vec<char> = sentence.chars().collect();
        let Some((pos, len)) = first_match(&chars, &patterns) else {
            continue;
        };
        out.push(render(&chars, pos, len, &patterns));
        if out.len() == MAX_HIGHLIGHTS {
            break;
        }
    }
    out
}

fn sentences(body: &str) -> impl Iterator<Item = &str> {
    body.split_inclusive(|c: char| matches!(c, '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn chars_eq(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn match_at(chars: &[char], at: usize, pattern: &[char]) -> bool {
    at + pattern.len() <= chars.len()
        && chars[at..at + pattern.len()]
            .iter()
            .zip(pattern)
            .all(|(&a, &b)| chars_eq(a, b))
}

fn longest_match_at(chars: &[char], at: usize, patterns: &[Vec<char>]) -> Option<usize> {
    patterns
        .iter()
        .find(|p| match_at(chars, at, p))
        .map(|p| p.len())
}

fn first_match(chars: &[char], patterns: &[Vec<char>]) -> Option<(usize, usize)> {
    (0..chars.len()).find_map(|i| longest_match_at(chars, i, patterns).map(|len| (i, len)))
}

fn render(chars: &[char], pos: usize, len: usize, patterns: &[Vec<char>]) -> String {
    let width = SNIPPET_CHARS.max(len);
    let (start, end) = if chars.len() <= width {
        (0, chars.len())
    } else {
        let start = (pos + len / 2).saturating_sub(width / 2);
        let end = (start + width).min(chars.len());
        (end - width, end)
    };

    let window = &chars[start..end];
    let mut snippet = String::with_capacity(window.len() + 16);
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    let mut i = 0;
    while i < window.len() {
        match longest_match_at(window, i, patterns) {
            Some(n) => {
                snippet.push_str("**");
                snippet.extend(&window[i..i + n]);
                snippet.push_str("**");
                i += n;
            }
            None => {
                snippet.push(window[i]);
                i += 1;
            }
        }
    }
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

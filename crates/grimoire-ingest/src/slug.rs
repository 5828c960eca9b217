//! Identifier derivation for chapters.

/// Convert a string to a slug: lowercase ASCII alphanumerics separated by single hyphens.
///
/// Characters outside `[a-z0-9]`, whitespace and `-` are dropped rather than replaced,
/// so `"Handler's Guide"` becomes `"handlers-guide"`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        match c {
            'a'..='z' | '0'..='9' => {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c);
            }
            '-' => pending_hyphen = true,
            c if c.is_whitespace() => pending_hyphen = true,
            _ => {}
        }
    }

    slug
}

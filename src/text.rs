//! Text cleanup and word counting for extracted PDF text.
//!
//! PDF text extraction produces ragged output: hard line breaks mid-
//! sentence, tab-separated columns, stray control characters from
//! broken ToUnicode maps. `clean` normalizes all of that into a single
//! space-separated string so downstream analysis sees plain prose.

/// Collapse whitespace runs to single spaces, strip ASCII/C1 control
/// characters (U+0000–U+001F, U+007F–U+009F), and trim the ends.
///
/// Idempotent: cleaning already-clean text is a no-op.
pub fn clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        // Unicode Cc covers exactly U+0000–U+001F and U+007F–U+009F
        if c.is_control() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

/// Count words: whitespace-separated tokens containing at least one
/// Unicode letter or digit. Pure-punctuation tokens don't count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// Safely truncate a string at a UTF-8 boundary
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() { return s; }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

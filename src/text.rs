//! Small text helpers shared by the search agent and the orchestrator.

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
///
/// Returns a `&str` that is always valid UTF-8 and at most `max_bytes` long.
/// If the byte at `max_bytes` is inside a multi-byte character, the slice is
/// shortened to the preceding character boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // Walk backward to find a valid char boundary
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Whitespace ─────────────────────────────────────────────────────────────

/// Collapse all runs of whitespace (spaces, tabs, newlines) to single spaces.
///
/// Scraped page text arrives with deep indentation and blank-line runs;
/// the model only needs the visible words.
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

//! Trailing `NEXT:` directive handling.
//!
//! Models are instructed to end each chunk with a `NEXT: [...]` line naming
//! the upcoming subtopic. The line is removed from the document and kept only
//! as a bookkeeping hint.

use regex::Regex;
use std::sync::LazyLock;

static NEXT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*NEXT:\s*(.+)\s*$").expect("valid NEXT directive regex"));

/// Hints that end an authoring session.
pub const TERMINAL_MARKERS: &[&str] = &["END", "DONE", "STOP", "FINISHED"];

/// Remove the last `NEXT:` line from `text`.
///
/// Returns the right-trimmed text and the hint with surrounding brackets
/// removed. Earlier `NEXT:` lines are left untouched.
pub fn strip_next_directive(text: &str) -> (String, Option<String>) {
    let Some(last) = NEXT_LINE.captures_iter(text).last() else {
        return (text.trim_end().to_string(), None);
    };
    let (Some(whole), Some(hint)) = (last.get(0), last.get(1)) else {
        return (text.trim_end().to_string(), None);
    };

    let mut body = String::with_capacity(text.len());
    body.push_str(&text[..whole.start()]);
    body.push_str(&text[whole.end()..]);

    let hint = unbracket(hint.as_str());
    let hint = (!hint.is_empty()).then_some(hint);
    (body.trim_end().to_string(), hint)
}

fn unbracket(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner.trim().to_string()
}

/// Whether a hint ends the session (case-insensitive).
pub fn is_terminal_marker(hint: &str) -> bool {
    let upper = unbracket(hint).to_uppercase();
    TERMINAL_MARKERS.contains(&upper.as_str())
}

//! Anchors and the fixed continuation instructions.
//!
//! An anchor is the trailing excerpt of the text produced so far. It is sent
//! back to the model so the next turn picks up exactly where the previous one
//! stopped, without restating earlier content.

use crate::util::tail_chars;

/// First directive of every authoring session.
pub const BEGIN_DIRECTIVE: &str = "BEGIN";

/// Fallback prompt when no anchor can be derived.
pub const PLAIN_CONTINUE: &str = "continue.";

/// Appended to the anchor prompt when extending a turn within its subtopic.
pub const EXTEND_SUFFIX: &str = "\nFill to the per-response output limit within this same subtopic. \
Do not reintroduce or restart; continue exactly. \
Do not write a NEXT line yet; do not conclude.";

/// Sentence ends are only honoured this close to the end of the excerpt.
const SENTENCE_END_WINDOW: usize = 120;

/// Derive an anchor from the last `max_chars` characters of `text`.
///
/// When a sentence end (`.`, `!`, `?`) falls within the final 120 characters
/// of the excerpt, the excerpt is cut just after it so the anchor ends on a
/// full sentence. The result is whitespace-trimmed.
pub fn anchor_from_text(text: &str, max_chars: usize) -> String {
    if text.is_empty() || max_chars == 0 {
        return String::new();
    }
    let excerpt = tail_chars(text, max_chars);
    let cut = excerpt
        .rfind(['.', '!', '?'])
        .filter(|&p| excerpt[p + 1..].chars().count() < SENTENCE_END_WINDOW);
    match cut {
        Some(p) => excerpt[..=p].trim().to_string(),
        None => excerpt.trim().to_string(),
    }
}

/// Wrap an anchor in the continuation instruction.
pub fn build_anchor_continue_prompt(anchor: &str) -> String {
    format!(
        "Continue exactly from after the following anchor. Do not repeat the anchor. \
Do not reintroduce the subject or previous headings; do not summarize; pick up mid-paragraph if needed.\n\
ANCHOR:\n<<<ANCHOR\n{anchor}\nANCHOR>>>\nContinue."
    )
}

/// Build the prompt for one extension pass over `turn_text`.
pub fn build_extend_prompt(turn_text: &str, anchor_chars: usize) -> String {
    let anchor = anchor_from_text(turn_text, anchor_chars);
    build_anchor_continue_prompt(&anchor) + EXTEND_SUFFIX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_anchor() {
        assert_eq!(anchor_from_text("", 200), "");
    }

    #[test]
    fn anchor_ends_on_nearby_sentence_end() {
        let text = "First sentence. Second sentence! And a trailing fragment";
        assert_eq!(
            anchor_from_text(text, 200),
            "First sentence. Second sentence!"
        );
    }

    #[test]
    fn distant_sentence_end_is_ignored() {
        let fragment = "x".repeat(130);
        let text = format!("Early end. {fragment}");
        assert_eq!(anchor_from_text(&text, 200), text);
    }

    #[test]
    fn anchor_is_bounded_by_char_count() {
        let text = "ab".repeat(300);
        assert_eq!(anchor_from_text(&text, 200).chars().count(), 200);
        let multibyte = "é".repeat(300);
        assert_eq!(anchor_from_text(&multibyte, 50).chars().count(), 50);
    }

    #[test]
    fn prompts_embed_anchor() {
        let prompt = build_anchor_continue_prompt("the end.");
        assert!(prompt.contains("<<<ANCHOR\nthe end.\nANCHOR>>>"));
        assert!(prompt.ends_with("Continue."));

        let ext = build_extend_prompt("Some text here.", 200);
        assert!(ext.contains("Some text here."));
        assert!(ext.ends_with("do not conclude."));
    }
}

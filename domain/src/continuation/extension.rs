//! Extending a short turn within its subtopic.

use super::anchor::{anchor_from_text, build_extend_prompt};
use super::directive::strip_next_directive;
use super::policy::ContinuationPolicy;
use super::repetition::jaccard_ngrams;
use crate::util::{char_len, head_chars};

/// Minimum growth per pass before it counts as a stall.
const MIN_GROWTH_CHARS: usize = 50;

/// Consecutive low-growth passes tolerated before extension is abandoned.
const LOW_GROWTH_LIMIT: u32 = 2;

/// What happened to one extension reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionOutcome {
    Appended { growth: usize },
    /// The reply had no text; extension stops.
    Empty,
    /// The reply repeated the prior tail and was discarded; extension stops.
    Repetitive { score: f64 },
    /// Appended, but growth stalled twice in a row; extension stops.
    LowGrowthAbandoned { growth: usize, min_expected: usize },
}

/// Join `piece` onto `text` with a blank line unless `text` already ends a line.
pub fn join_piece(text: &mut String, piece: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push_str("\n\n");
    }
    text.push_str(piece);
}

/// The text of one turn while it is being extended.
#[derive(Debug, Clone, Default)]
pub struct TurnDraft {
    text: String,
    hint: Option<String>,
    passes: u32,
    low_growth_streak: u32,
    stopped: bool,
}

impl TurnDraft {
    /// Start from the turn's first reply, with its directive stripped.
    pub fn from_reply(reply: &str) -> Self {
        let (text, hint) = strip_next_directive(reply);
        Self {
            text,
            hint,
            ..Default::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Whether another extension pass should be requested.
    pub fn wants_extension(&self, policy: &ContinuationPolicy) -> bool {
        !self.stopped
            && self.passes < policy.max_extension_passes
            && char_len(&self.text) < policy.min_chars
    }

    pub fn extension_prompt(&self, policy: &ContinuationPolicy) -> String {
        build_extend_prompt(&self.text, policy.anchor_chars)
    }

    /// Fold one extension reply into the draft.
    pub fn absorb(&mut self, reply: &str, policy: &ContinuationPolicy) -> ExtensionOutcome {
        let (body, hint) = strip_next_directive(reply);
        if body.trim().is_empty() {
            self.stopped = true;
            return ExtensionOutcome::Empty;
        }

        if policy.repetition_guard {
            let prior_tail = anchor_from_text(&self.text, policy.tail_window());
            let score = jaccard_ngrams(
                &prior_tail,
                head_chars(&body, policy.head_window()),
                policy.ngram,
            );
            if score > policy.repetition_threshold {
                self.stopped = true;
                return ExtensionOutcome::Repetitive { score };
            }
        }

        let before = char_len(&self.text);
        join_piece(&mut self.text, &body);
        let growth = char_len(&self.text) - before;
        if hint.is_some() {
            self.hint = hint;
        }
        self.passes += 1;

        let min_expected = MIN_GROWTH_CHARS.max(char_len(body.trim()) / 10);
        if growth < min_expected {
            self.low_growth_streak += 1;
            if self.low_growth_streak >= LOW_GROWTH_LIMIT {
                self.stopped = true;
                return ExtensionOutcome::LowGrowthAbandoned {
                    growth,
                    min_expected,
                };
            }
        } else {
            self.low_growth_streak = 0;
        }

        ExtensionOutcome::Appended { growth }
    }

    /// Stop extending (used after a failed extension request).
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Consume the draft into `(text, hint, passes)`.
    pub fn into_parts(self) -> (String, Option<String>, u32) {
        (self.text, self.hint, self.passes)
    }
}

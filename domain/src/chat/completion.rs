//! Completion result value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phrases that suggest the upstream truncated or refused the answer.
const FILTER_PHRASES: &[&str] = &["content filter", "filtered", "inappropriate", "not allowed"];

/// Note appended to a response classified as filtered.
pub const CONTENT_FILTER_NOTE: &str =
    "\n\nResponse was truncated (filter/limit). Consider reducing length or simplifying.";

/// Why a completion ended.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(s) => s,
        }
    }
}

impl From<String> for FinishReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" | "content-filter" => FinishReason::ContentFilter,
            _ => FinishReason::Other(s),
        }
    }
}

impl From<FinishReason> for String {
    fn from(reason: FinishReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully aggregated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub finish_reason: FinishReason,
}

impl Completion {
    /// Build the aggregated answer, classifying likely filter responses.
    ///
    /// When the text looks filtered the reason becomes `content_filter` and
    /// [`CONTENT_FILTER_NOTE`] is appended; otherwise the upstream reason
    /// (default `stop`) is kept.
    pub fn finalize(content: String, upstream_reason: Option<FinishReason>) -> Self {
        if looks_filtered(&content) {
            return Self {
                content: content + CONTENT_FILTER_NOTE,
                finish_reason: FinishReason::ContentFilter,
            };
        }
        Self {
            content,
            finish_reason: upstream_reason.unwrap_or_default(),
        }
    }
}

/// Heuristic check for filter/refusal wording.
pub fn looks_filtered(content: &str) -> bool {
    let lower = content.to_lowercase();
    FILTER_PHRASES.iter().any(|p| lower.contains(p))
}

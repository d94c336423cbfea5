//! Tunables for the continuation engine.

use serde::{Deserialize, Serialize};

/// How turns are anchored, extended and checked for repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuationPolicy {
    /// Anchor length in characters.
    pub anchor_chars: usize,
    /// A turn shorter than this is extended.
    pub min_chars: usize,
    /// Extension requests allowed per turn.
    pub max_extension_passes: u32,
    /// Jaccard score above which output counts as repetitive.
    pub repetition_threshold: f64,
    /// Character n-gram size for repetition scoring.
    pub ngram: usize,
    /// Disable to skip repetition scoring entirely.
    pub repetition_guard: bool,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            anchor_chars: 200,
            min_chars: 4500,
            max_extension_passes: 3,
            repetition_threshold: 0.35,
            ngram: 4,
            repetition_guard: true,
        }
    }
}

impl ContinuationPolicy {
    /// Length of the new text's head compared against the prior tail.
    pub fn head_window(&self) -> usize {
        self.anchor_chars.max(400)
    }

    /// Length of the prior tail used for repetition scoring.
    pub fn tail_window(&self) -> usize {
        (self.anchor_chars * 4).min(800)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_follow_anchor_size() {
        let policy = ContinuationPolicy::default();
        assert_eq!(policy.head_window(), 400);
        assert_eq!(policy.tail_window(), 800);

        let small = ContinuationPolicy {
            anchor_chars: 50,
            ..Default::default()
        };
        assert_eq!(small.tail_window(), 200);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let policy: ContinuationPolicy = serde_json::from_str(r#"{"min_chars": 100}"#).unwrap();
        assert_eq!(policy.min_chars, 100);
        assert_eq!(policy.anchor_chars, 200);
    }
}

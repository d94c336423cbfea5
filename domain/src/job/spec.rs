//! Job specification value objects

use crate::continuation::ContinuationPolicy;
use crate::util::{char_len, tail_chars};
use serde::{Deserialize, Serialize};

/// Per-job overrides of the continuation policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContinuationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", alias = "pushPasses")]
    pub max_extension_passes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", alias = "repeatWarn")]
    pub repetition_guard: Option<bool>,
}

impl ContinuationOverrides {
    pub fn apply(&self, base: &ContinuationPolicy) -> ContinuationPolicy {
        ContinuationPolicy {
            anchor_chars: self.anchor_chars.unwrap_or(base.anchor_chars),
            min_chars: self.min_chars.unwrap_or(base.min_chars),
            max_extension_passes: self
                .max_extension_passes
                .unwrap_or(base.max_extension_passes),
            repetition_threshold: self
                .repetition_threshold
                .unwrap_or(base.repetition_threshold),
            ngram: base.ngram,
            repetition_guard: self.repetition_guard.unwrap_or(base.repetition_guard),
        }
    }
}

/// What a job should produce and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Turn budget for the authoring session.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u32,
    #[serde(default)]
    pub continuation: ContinuationOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_message_id: Option<String>,
}

fn default_max_chunks() -> u32 {
    8
}

impl JobSpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: String::new(),
            max_chunks: default_max_chunks(),
            continuation: ContinuationOverrides::default(),
            fallback_backend: None,
            bridge_session_id: None,
            bridge_message_id: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_chunks(mut self, max_chunks: u32) -> Self {
        self.max_chunks = max_chunks;
        self
    }
}

/// Default size cap of a transplant summary, in characters.
pub const TRANSPLANT_SUMMARY_CHARS: usize = 2000;

/// Condense a parent job's plan, outline and latest output into a summary.
///
/// Plan and outline come first, each bounded to a third of `max_chars`; the
/// remaining budget goes to the tail of the parent's output.
pub fn build_transplant_summary(
    plan: Option<&str>,
    outline: Option<&str>,
    output: Option<&str>,
    max_chars: usize,
) -> Option<String> {
    let section_cap = max_chars / 3;
    let mut parts: Vec<String> = Vec::new();

    for (label, text) in [("PLAN", plan), ("OUTLINE", outline)] {
        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            parts.push(format!("{label}:\n{}", condense(text, section_cap)));
        }
    }

    let used: usize = parts.iter().map(|p| char_len(p)).sum();
    let tail_budget = max_chars.saturating_sub(used);
    if let Some(text) = output.map(str::trim).filter(|t| !t.is_empty())
        && tail_budget > 0
    {
        parts.push(format!("LAST OUTPUT (tail):\n{}", tail_chars(text, tail_budget).trim()));
    }

    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

fn condense(text: &str, cap: usize) -> String {
    if char_len(text) <= cap {
        return text.to_string();
    }
    let head: String = text.chars().take(cap.saturating_sub(3)).collect();
    format!("{}...", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_parses_camel_case_with_defaults() {
        let spec: JobSpec = serde_json::from_str(
            r#"{"model": "m", "systemPrompt": "write", "continuation": {"minChars": 100, "pushPasses": 1}}"#,
        )
        .unwrap();
        assert_eq!(spec.max_chunks, 8);
        assert_eq!(spec.system_prompt, "write");
        let policy = spec.continuation.apply(&ContinuationPolicy::default());
        assert_eq!(policy.min_chars, 100);
        assert_eq!(policy.max_extension_passes, 1);
        assert_eq!(policy.anchor_chars, 200);
    }

    #[test]
    fn transplant_summary_orders_sections() {
        let summary =
            build_transplant_summary(Some("Three parts"), Some("1. A\n2. B"), Some("...last words."), 2000)
                .unwrap();
        let plan = summary.find("PLAN:").unwrap();
        let outline = summary.find("OUTLINE:").unwrap();
        let tail = summary.find("LAST OUTPUT").unwrap();
        assert!(plan < outline && outline < tail);
    }

    #[test]
    fn transplant_summary_is_bounded() {
        let long = "word ".repeat(2000);
        let summary = build_transplant_summary(Some(&long), None, Some(&long), 600).unwrap();
        assert!(char_len(&summary) <= 600 + 40);
    }

    #[test]
    fn empty_parent_has_no_summary() {
        assert!(build_transplant_summary(None, Some("  "), None, 2000).is_none());
    }
}

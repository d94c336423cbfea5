//! Authoring session state machine.
//!
//! ```text
//! Seeding -> Generating -> Extending -> Evaluating -> Generating
//!                                                  -> Paused -> Generating (resume)
//!                                                  -> Finished
//! ```

use super::anchor::{BEGIN_DIRECTIVE, PLAIN_CONTINUE, anchor_from_text, build_anchor_continue_prompt};
use super::directive::is_terminal_marker;
use super::extension::join_piece;
use super::policy::ContinuationPolicy;
use super::repetition::jaccard_ngrams;
use crate::core::error::DomainError;
use crate::util::head_chars;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of an authoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoringPhase {
    Seeding,
    Generating,
    Extending,
    Evaluating,
    Paused,
    Finished,
}

impl AuthoringPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthoringPhase::Seeding => "seeding",
            AuthoringPhase::Generating => "generating",
            AuthoringPhase::Extending => "extending",
            AuthoringPhase::Evaluating => "evaluating",
            AuthoringPhase::Paused => "paused",
            AuthoringPhase::Finished => "finished",
        }
    }
}

impl fmt::Display for AuthoringPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnVerdict {
    /// Keep generating.
    Continue,
    /// Output repeated the prior tail; the session paused itself.
    Paused { score: f64 },
    /// The model signalled the end of the document.
    Finished { marker: String },
}

/// One long-form authoring session.
#[derive(Debug, Clone)]
pub struct AuthoringSession {
    accumulated_text: String,
    last_anchor: String,
    extension_passes_used: u32,
    repetition_score: f64,
    turns_completed: u32,
    one_shot_override: Option<String>,
    last_hint: Option<String>,
    phase: AuthoringPhase,
}

impl Default for AuthoringSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthoringSession {
    pub fn new() -> Self {
        Self {
            accumulated_text: String::new(),
            last_anchor: String::new(),
            extension_passes_used: 0,
            repetition_score: 0.0,
            turns_completed: 0,
            one_shot_override: None,
            last_hint: None,
            phase: AuthoringPhase::Seeding,
        }
    }

    /// Rebuild a session from persisted output, e.g. when a job is resumed.
    pub fn resume_from(text: impl Into<String>, turns_completed: u32) -> Self {
        let accumulated_text = text.into();
        let phase = if turns_completed == 0 && accumulated_text.is_empty() {
            AuthoringPhase::Seeding
        } else {
            AuthoringPhase::Generating
        };
        Self {
            accumulated_text,
            turns_completed,
            phase,
            ..Self::new()
        }
    }

    pub fn phase(&self) -> AuthoringPhase {
        self.phase
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn last_anchor(&self) -> &str {
        &self.last_anchor
    }

    pub fn extension_passes_used(&self) -> u32 {
        self.extension_passes_used
    }

    pub fn repetition_score(&self) -> f64 {
        self.repetition_score
    }

    pub fn turns_completed(&self) -> u32 {
        self.turns_completed
    }

    pub fn last_hint(&self) -> Option<&str> {
        self.last_hint.as_deref()
    }

    pub fn pending_override(&self) -> Option<&str> {
        self.one_shot_override.as_deref()
    }

    /// Queue an operator prompt for the next generating turn.
    pub fn set_override(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.one_shot_override = (!text.trim().is_empty()).then_some(text);
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, AuthoringPhase::Paused | AuthoringPhase::Finished)
    }

    /// Produce the prompt for the next turn and enter the generating phase.
    ///
    /// The one-shot override is consumed here.
    pub fn next_prompt(&mut self, policy: &ContinuationPolicy) -> Result<String, DomainError> {
        let prompt = match self.phase {
            AuthoringPhase::Seeding => BEGIN_DIRECTIVE.to_string(),
            AuthoringPhase::Generating => {
                if let Some(text) = self.one_shot_override.take() {
                    text
                } else {
                    self.last_anchor = anchor_from_text(&self.accumulated_text, policy.anchor_chars);
                    if self.last_anchor.is_empty() {
                        PLAIN_CONTINUE.to_string()
                    } else {
                        build_anchor_continue_prompt(&self.last_anchor)
                    }
                }
            }
            other => {
                return Err(DomainError::InvalidSessionState(format!(
                    "cannot start a turn while {other}"
                )));
            }
        };
        self.phase = AuthoringPhase::Generating;
        Ok(prompt)
    }

    pub fn begin_extension(&mut self) {
        if self.phase == AuthoringPhase::Generating {
            self.phase = AuthoringPhase::Extending;
        }
    }

    /// Score `body` against the prior text, append it, and decide what next.
    ///
    /// Repetition is measured between the head of the new text and the tail
    /// of what existed before this turn. A terminal hint wins over a
    /// repetition pause.
    pub fn commit_turn(
        &mut self,
        body: &str,
        hint: Option<String>,
        passes_used: u32,
        policy: &ContinuationPolicy,
    ) -> TurnVerdict {
        self.phase = AuthoringPhase::Evaluating;

        self.repetition_score = if policy.repetition_guard {
            let prior_tail = anchor_from_text(&self.accumulated_text, policy.tail_window());
            jaccard_ngrams(&prior_tail, head_chars(body, policy.head_window()), policy.ngram)
        } else {
            0.0
        };

        join_piece(&mut self.accumulated_text, body);
        self.extension_passes_used = passes_used;
        self.turns_completed += 1;
        self.last_hint = hint;

        if let Some(marker) = self.last_hint.as_deref().filter(|h| is_terminal_marker(h)) {
            let marker = marker.to_string();
            self.phase = AuthoringPhase::Finished;
            return TurnVerdict::Finished { marker };
        }

        if self.repetition_score > policy.repetition_threshold {
            self.phase = AuthoringPhase::Paused;
            return TurnVerdict::Paused {
                score: self.repetition_score,
            };
        }

        self.phase = AuthoringPhase::Generating;
        TurnVerdict::Continue
    }

    pub fn pause(&mut self) {
        if self.phase != AuthoringPhase::Finished {
            self.phase = AuthoringPhase::Paused;
        }
    }

    /// Leave `Paused`; the next turn generates from the anchor or override.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        match self.phase {
            AuthoringPhase::Paused => {
                self.phase = if self.turns_completed == 0 {
                    AuthoringPhase::Seeding
                } else {
                    AuthoringPhase::Generating
                };
                Ok(())
            }
            AuthoringPhase::Finished => Err(DomainError::InvalidSessionState(
                "session already finished".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn finish(&mut self) {
        self.phase = AuthoringPhase::Finished;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ContinuationPolicy {
        ContinuationPolicy {
            min_chars: 0,
            ..Default::default()
        }
    }

    #[test]
    fn first_prompt_is_begin_then_anchor() {
        let policy = policy();
        let mut session = AuthoringSession::new();
        assert_eq!(session.next_prompt(&policy).unwrap(), "BEGIN");

        let verdict = session.commit_turn("Chapter one is done.", Some("Chapter 2".into()), 0, &policy);
        assert_eq!(verdict, TurnVerdict::Continue);

        let prompt = session.next_prompt(&policy).unwrap();
        assert!(prompt.contains("Chapter one is done."));
        assert_eq!(session.last_anchor(), "Chapter one is done.");
        assert_eq!(session.last_hint(), Some("Chapter 2"));
    }

    #[test]
    fn override_is_used_once() {
        let policy = policy();
        let mut session = AuthoringSession::resume_from("Existing text.", 1);
        session.set_override("Write the glossary now.");
        assert_eq!(session.next_prompt(&policy).unwrap(), "Write the glossary now.");
        session.commit_turn("Glossary body.", None, 0, &policy);
        assert!(session.next_prompt(&policy).unwrap().contains("ANCHOR"));
        assert!(session.pending_override().is_none());
    }

    #[test]
    fn blank_anchor_falls_back_to_plain_continue() {
        let policy = policy();
        let mut session = AuthoringSession::resume_from("   ", 1);
        assert_eq!(session.next_prompt(&policy).unwrap(), "continue.");
    }

    #[test]
    fn terminal_hint_finishes() {
        let policy = policy();
        let mut session = AuthoringSession::new();
        session.next_prompt(&policy).unwrap();
        let verdict = session.commit_turn("The end.", Some("end".into()), 0, &policy);
        assert_eq!(verdict, TurnVerdict::Finished { marker: "end".into() });
        assert!(!session.is_active());
        assert!(session.next_prompt(&policy).is_err());
        assert!(session.resume().is_err());
    }

    #[test]
    fn repetition_pauses_and_resume_continues() {
        let policy = policy();
        let body = "The same paragraph keeps coming back word for word again.";
        let mut session = AuthoringSession::new();
        session.next_prompt(&policy).unwrap();
        assert_eq!(session.commit_turn(body, None, 0, &policy), TurnVerdict::Continue);

        session.next_prompt(&policy).unwrap();
        let verdict = session.commit_turn(body, None, 0, &policy);
        assert!(matches!(verdict, TurnVerdict::Paused { score } if score > 0.9));
        assert_eq!(session.phase(), AuthoringPhase::Paused);

        session.resume().unwrap();
        assert_eq!(session.phase(), AuthoringPhase::Generating);
        assert_eq!(session.turns_completed(), 2);
    }

    #[test]
    fn turns_are_joined_into_document() {
        let policy = policy();
        let mut session = AuthoringSession::new();
        session.next_prompt(&policy).unwrap();
        session.commit_turn("Part one.", None, 2, &policy);
        session.next_prompt(&policy).unwrap();
        session.commit_turn("Part two.", None, 0, &policy);
        assert_eq!(session.accumulated_text(), "Part one.\n\nPart two.");
        assert_eq!(session.extension_passes_used(), 0);
    }
}

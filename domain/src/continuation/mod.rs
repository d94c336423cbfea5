//! Continuation primitives for long-form, multi-turn authoring.

pub mod anchor;
pub mod directive;
pub mod extension;
pub mod policy;
pub mod repetition;
pub mod session;

pub use anchor::{
    BEGIN_DIRECTIVE, EXTEND_SUFFIX, PLAIN_CONTINUE, anchor_from_text, build_anchor_continue_prompt,
    build_extend_prompt,
};
pub use directive::{TERMINAL_MARKERS, is_terminal_marker, strip_next_directive};
pub use extension::{ExtensionOutcome, TurnDraft, join_piece};
pub use policy::ContinuationPolicy;
pub use repetition::jaccard_ngrams;
pub use session::{AuthoringPhase, AuthoringSession, TurnVerdict};

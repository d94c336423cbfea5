//! Domain layer for arena-relay
//!
//! Pure logic with no I/O: everything here is deterministic given its
//! inputs, which keeps the relay's trickiest parts unit-testable.
//!
//! # Core Concepts
//!
//! ## Stream
//!
//! - **Frame decoding**: the peer relays the upstream UI's framed stream
//!   (`a0:"..."` tokens, `ad:{...}` finish markers, `{"error":...}` objects)
//! - **Challenge detection**: interstitial anti-bot pages and the bounded
//!   per-request refresh budget
//!
//! ## Chat
//!
//! Client requests, message normalization and translation into the provider
//! envelope the peer posts upstream.
//!
//! ## Continuation
//!
//! Anchors, `NEXT:` directives, repetition scoring and the authoring session
//! state machine used to stitch long documents out of many turns.
//!
//! ## Job
//!
//! Durable jobs, their state machine and event log entries, and the
//! quiet-hours/concurrency admission policy.

pub mod chat;
pub mod continuation;
pub mod core;
pub mod job;
pub mod stream;
pub mod util;

// Re-export commonly used types
pub use chat::{
    ChatCompletionRequest, ChatMessage, Completion, ConversationMode, EndpointEntry,
    EndpointMapping, FinishReason, ParticipantPosition, ProviderEnvelope, Role, Route,
    TranslationError, TranslationOptions, translate,
};
pub use continuation::{
    AuthoringPhase, AuthoringSession, ContinuationPolicy, ExtensionOutcome, TurnDraft, TurnVerdict,
};
pub use crate::core::{
    error::DomainError,
    validation::{ConfigIssue, ConfigIssueCode, Severity},
};
pub use job::{
    AdmissionDecision, ConcurrencyLimits, ContinuationOverrides, Job, JobEvent, JobEventKind,
    JobSpec, JobState, QuietHours, SchedulePolicy,
};
pub use stream::{ChallengeDecision, ChallengeDetector, ChallengeState, DecodedEvent, FrameDecoder};

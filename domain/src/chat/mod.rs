//! Chat domain: messages, requests, the provider envelope and completions.

pub mod completion;
pub mod envelope;
pub mod message;
pub mod request;

pub use completion::{CONTENT_FILTER_NOTE, Completion, FinishReason, looks_filtered};
pub use envelope::{
    ConversationMode, EndpointEntry, EndpointMapping, MessageTemplate, ParticipantPosition,
    ProviderEnvelope, Route, TranslationError, TranslationOptions, translate,
};
pub use message::{ChatMessage, Role};
pub use request::ChatCompletionRequest;

//! Application layer for arena-relay
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::SupervisorParams;
pub use ports::{
    artifact_sink::{ArtifactError, ArtifactSink},
    chat_backend::{BackendError, BackendSet, ChatBackend},
    clock::Clock,
    continuation_observer::{ContinuationObserver, NoContinuationObserver, TurnReport},
    job_store::{JobStore, StoreError},
};
pub use use_cases::run_continuation::{
    ContinuationContext, ContinuationEngine, ContinuationError, SessionControl, SessionEnd,
};
pub use use_cases::schedule_jobs::{JobScheduler, SchedulerStatus};
pub use use_cases::supervise_jobs::{JobSupervisor, OUTPUT_ARTIFACT, SupervisorError};

//! Port definitions (interfaces for external adapters)
//!
//! - [`chat_backend`]: model endpoints reached by the continuation engine
//! - [`job_store`]: durable job records and event logs
//! - [`artifact_sink`]: per-job text artifacts
//! - [`clock`]: wall-clock time
//! - [`continuation_observer`]: per-turn progress callbacks

pub mod artifact_sink;
pub mod chat_backend;
pub mod clock;
pub mod continuation_observer;
pub mod job_store;

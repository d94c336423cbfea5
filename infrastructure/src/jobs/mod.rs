//! File-backed job persistence

pub mod artifact_sink;
pub mod file_store;

pub use artifact_sink::FileArtifactSink;
pub use file_store::FileJobStore;

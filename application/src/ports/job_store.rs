//! Job persistence port
//!
//! A job record plus its append-only event log form the durability boundary:
//! every state change is saved before it is acted upon.

use async_trait::async_trait;
use relay_domain::{Job, JobEvent};
use thiserror::Error;

/// Errors raised by a job store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Corrupt record for job {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store worker failed: {0}")]
    Worker(String),
}

/// Durable storage for job records and event logs.
///
/// Callers treat a failed write as fatal for the operation that caused it.
/// Implementations doing blocking I/O must move it off the async workers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create or atomically replace the job record.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    async fn load(&self, id: &str) -> Result<Job, StoreError>;

    /// All stored jobs, oldest first.
    async fn list(&self) -> Result<Vec<Job>, StoreError>;

    /// Append one event and make it durable before returning.
    async fn append_event(&self, event: &JobEvent) -> Result<(), StoreError>;

    async fn events(&self, id: &str) -> Result<Vec<JobEvent>, StoreError>;
}

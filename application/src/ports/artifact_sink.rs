//! Artifact sink port

use thiserror::Error;

/// Errors raised by an artifact sink
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Invalid artifact kind: {0}")]
    InvalidKind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Named text artifacts per job (`output`, `plan`, `outline`, ...).
pub trait ArtifactSink: Send + Sync {
    /// Where an artifact of `kind` lives for `job_id`.
    fn locate(&self, job_id: &str, kind: &str) -> Result<String, ArtifactError>;

    /// Replace the artifact's content and return its path.
    fn write(&self, job_id: &str, kind: &str, content: &str) -> Result<String, ArtifactError>;

    /// Read an artifact; `None` if it was never written.
    fn read(&self, job_id: &str, kind: &str) -> Result<Option<String>, ArtifactError>;

    /// Copy an artifact between jobs, returning the new path if it existed.
    fn copy(&self, from_job: &str, to_job: &str, kind: &str) -> Result<Option<String>, ArtifactError> {
        match self.read(from_job, kind)? {
            Some(content) => self.write(to_job, kind, &content).map(Some),
            None => Ok(None),
        }
    }
}

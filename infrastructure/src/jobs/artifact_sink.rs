//! File-backed artifact sink writing `<dir>/<id>/artifacts/<kind>.md`.

use relay_application::{ArtifactError, ArtifactSink};
use std::path::PathBuf;

pub struct FileArtifactSink {
    root: PathBuf,
}

impl FileArtifactSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, job_id: &str, kind: &str) -> Result<PathBuf, ArtifactError> {
        if !is_safe_name(kind) {
            return Err(ArtifactError::InvalidKind(kind.to_string()));
        }
        if !is_safe_name(job_id) {
            return Err(ArtifactError::InvalidKind(format!("job id {job_id}")));
        }
        Ok(self
            .root
            .join(job_id)
            .join("artifacts")
            .join(format!("{kind}.md")))
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ArtifactSink for FileArtifactSink {
    fn locate(&self, job_id: &str, kind: &str) -> Result<String, ArtifactError> {
        Ok(self.path(job_id, kind)?.to_string_lossy().into_owned())
    }

    fn write(&self, job_id: &str, kind: &str, content: &str) -> Result<String, ArtifactError> {
        let path = self.path(job_id, kind)?;
        crate::catalog::write_atomic(&path, content)?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn read(&self, job_id: &str, kind: &str) -> Result<Option<String>, ArtifactError> {
        let path = self.path(job_id, kind)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

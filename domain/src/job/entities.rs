//! Job entities and the job state machine.
//!
//! ```text
//! Pending -> Running -> Done
//!               |  \-> Failed ---------\
//!               |  \-> Stalled --------+--> Pending (resume)
//!               \-> Retrying -> Running |
//!                        \-> Failed     |
//! any non-terminal -> Cancelled --------/
//! ```
//!
//! `Done` is final: a finished job can only be forked into a new one.

use super::spec::JobSpec;
use crate::core::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Running,
    Stalled,
    Retrying,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Stalled => "STALLED",
            JobState::Retrying => "RETRYING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    /// States a job does not leave on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    /// Whether `self -> to` is a declared transition.
    pub fn can_transition(self, to: JobState) -> bool {
        use JobState::*;
        match (self, to) {
            (Done, _) => false,
            (from, Cancelled) => !from.is_terminal(),
            (Pending, Running) => true,
            (Running, Done | Failed | Stalled | Retrying) => true,
            (Retrying, Running | Failed | Stalled) => true,
            (Stalled | Failed | Cancelled, Pending) => true,
            _ => false,
        }
    }

    /// Whether a job in this state may be resumed.
    pub fn is_resumable(&self) -> bool {
        matches!(self, JobState::Stalled | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobState::Pending),
            "RUNNING" => Ok(JobState::Running),
            "STALLED" => Ok(JobState::Stalled),
            "RETRYING" => Ok(JobState::Retrying),
            "DONE" => Ok(JobState::Done),
            "FAILED" => Ok(JobState::Failed),
            "CANCELLED" => Ok(JobState::Cancelled),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}

/// A durable, long-running authoring job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub spec: JobSpec,
    pub backend: String,
    pub state: JobState,
    #[serde(default)]
    pub retries: u32,
    /// Artifact kind -> file path.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transplant_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        spec: JobSpec,
        backend: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            spec,
            backend: backend.into(),
            state: JobState::Pending,
            retries: 0,
            artifacts: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            parent_id: None,
            transplant_summary: None,
            last_error: None,
        }
    }

    /// Apply a declared transition, returning the previous state.
    pub fn transition(&mut self, to: JobState, now: DateTime<Utc>) -> Result<JobState, DomainError> {
        let from = self.state;
        if !from.can_transition(to) {
            return Err(DomainError::InvalidTransition { from, to });
        }
        self.state = to;
        self.updated_at = now;
        Ok(from)
    }

    /// Build an unsaved child job carrying this job's spec and artifacts.
    pub fn fork(
        &self,
        id: impl Into<String>,
        backend: Option<String>,
        transplant_summary: Option<String>,
        now: DateTime<Utc>,
    ) -> Job {
        let mut child = Job::new(
            id,
            format!("{} (fork)", self.name),
            self.spec.clone(),
            backend.unwrap_or_else(|| self.backend.clone()),
            now,
        );
        child.artifacts = self.artifacts.clone();
        child.parent_id = Some(self.id.clone());
        child.transplant_summary = transplant_summary;
        child
    }

    /// System prompt with the transplant summary appended when present.
    pub fn effective_system_prompt(&self) -> String {
        match self.transplant_summary.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(summary) if self.spec.system_prompt.is_empty() => {
                format!("CONTEXT FROM PARENT JOB:\n{summary}")
            }
            Some(summary) => format!(
                "{}\n\nCONTEXT FROM PARENT JOB:\n{summary}",
                self.spec.system_prompt
            ),
            None => self.spec.system_prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::JobState::*;

    const ALL: [JobState; 7] = [Pending, Running, Stalled, Retrying, Done, Failed, Cancelled];

    fn job() -> Job {
        Job::new("j1", "book", JobSpec::new("model-x"), "bridge", Utc::now())
    }

    #[test]
    fn transition_table() {
        let allowed = [
            (Pending, Running),
            (Pending, Cancelled),
            (Running, Done),
            (Running, Failed),
            (Running, Stalled),
            (Running, Retrying),
            (Running, Cancelled),
            (Retrying, Running),
            (Retrying, Failed),
            (Retrying, Stalled),
            (Retrying, Cancelled),
            (Stalled, Pending),
            (Stalled, Cancelled),
            (Failed, Pending),
            (Cancelled, Pending),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn nothing_leaves_done() {
        let mut job = job();
        job.transition(Running, Utc::now()).unwrap();
        job.transition(Done, Utc::now()).unwrap();
        for to in ALL {
            let err = job.transition(to, Utc::now()).unwrap_err();
            assert_eq!(err, DomainError::InvalidTransition { from: Done, to });
        }
        assert_eq!(job.state, Done);
    }

    #[test]
    fn transition_updates_timestamp() {
        let mut job = job();
        let later = job.updated_at + chrono::Duration::seconds(5);
        assert_eq!(job.transition(Running, later).unwrap(), Pending);
        assert_eq!(job.updated_at, later);
    }

    #[test]
    fn fork_links_parent_and_copies_artifacts() {
        let mut parent = job();
        parent
            .artifacts
            .insert("output".to_string(), "/tmp/j1/artifacts/output.md".to_string());
        parent.state = Done;

        let child = parent.fork("j2", None, Some("Plan: three parts".to_string()), Utc::now());
        assert_eq!(child.state, Pending);
        assert_eq!(child.parent_id.as_deref(), Some("j1"));
        assert_eq!(child.backend, "bridge");
        assert_eq!(child.artifacts, parent.artifacts);
        assert!(child.effective_system_prompt().contains("Plan: three parts"));

        let moved = parent.fork("j3", Some("openrouter".to_string()), None, Utc::now());
        assert_eq!(moved.backend, "openrouter");
    }

    #[test]
    fn state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Retrying).unwrap(), "\"RETRYING\"");
        assert_eq!("cancelled".parse::<JobState>().unwrap(), Cancelled);
        assert!("paused".parse::<JobState>().is_err());
    }
}

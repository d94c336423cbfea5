//! Job event log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a job event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobEventKind {
    JobSubmitted,
    StateChanged,
    JobStarted,
    ChunkDone,
    NextHint,
    NextHintApplied,
    NextOverrideQueued,
    ExtendAbandonedForLowGrowth,
    ExtendFailed,
    RepetitionGuard,
    RepetitionWarning,
    WatchdogTimeout,
    RetryDecision,
    Retry,
    Failover,
    JobPaused,
    JobResumed,
    JobCancelled,
    JobForked,
    JobCompleted,
    JobFailed,
    JobEnded,
    Other(String),
}

impl JobEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            JobEventKind::JobSubmitted => "job_submitted",
            JobEventKind::StateChanged => "state_changed",
            JobEventKind::JobStarted => "job_started",
            JobEventKind::ChunkDone => "chunk_done",
            JobEventKind::NextHint => "next_hint",
            JobEventKind::NextHintApplied => "next_hint_applied",
            JobEventKind::NextOverrideQueued => "next_override_queued",
            JobEventKind::ExtendAbandonedForLowGrowth => "extend_abandoned_for_low_growth",
            JobEventKind::ExtendFailed => "extend_failed",
            JobEventKind::RepetitionGuard => "repetition_guard",
            JobEventKind::RepetitionWarning => "repetition_warning",
            JobEventKind::WatchdogTimeout => "watchdog_timeout",
            JobEventKind::RetryDecision => "retry_decision",
            JobEventKind::Retry => "retry",
            JobEventKind::Failover => "failover",
            JobEventKind::JobPaused => "job_paused",
            JobEventKind::JobResumed => "job_resumed",
            JobEventKind::JobCancelled => "job_cancelled",
            JobEventKind::JobForked => "job_forked",
            JobEventKind::JobCompleted => "job_completed",
            JobEventKind::JobFailed => "job_failed",
            JobEventKind::JobEnded => "job_ended",
            JobEventKind::Other(s) => s,
        }
    }
}

impl From<String> for JobEventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "job_submitted" => JobEventKind::JobSubmitted,
            "state_changed" => JobEventKind::StateChanged,
            "job_started" => JobEventKind::JobStarted,
            "chunk_done" => JobEventKind::ChunkDone,
            "next_hint" => JobEventKind::NextHint,
            "next_hint_applied" => JobEventKind::NextHintApplied,
            "next_override_queued" => JobEventKind::NextOverrideQueued,
            "extend_abandoned_for_low_growth" => JobEventKind::ExtendAbandonedForLowGrowth,
            "extend_failed" => JobEventKind::ExtendFailed,
            "repetition_guard" => JobEventKind::RepetitionGuard,
            "repetition_warning" => JobEventKind::RepetitionWarning,
            "watchdog_timeout" => JobEventKind::WatchdogTimeout,
            "retry_decision" => JobEventKind::RetryDecision,
            "retry" => JobEventKind::Retry,
            "failover" => JobEventKind::Failover,
            "job_paused" => JobEventKind::JobPaused,
            "job_resumed" => JobEventKind::JobResumed,
            "job_cancelled" => JobEventKind::JobCancelled,
            "job_forked" => JobEventKind::JobForked,
            "job_completed" => JobEventKind::JobCompleted,
            "job_failed" => JobEventKind::JobFailed,
            "job_ended" => JobEventKind::JobEnded,
            _ => JobEventKind::Other(s),
        }
    }
}

impl From<JobEventKind> for String {
    fn from(kind: JobEventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable line of a job's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: JobEventKind,
    pub job_id: String,
    #[serde(flatten)]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl JobEvent {
    pub fn new(kind: JobEventKind, job_id: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            ts,
            kind,
            job_id: job_id.into(),
            extras: serde_json::Map::new(),
        }
    }

    /// Attach one extra field.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }
}

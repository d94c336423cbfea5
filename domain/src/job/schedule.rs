//! Admission policy: quiet hours and concurrency ceilings.

use crate::core::error::DomainError;
use chrono::NaiveTime;
use std::collections::BTreeMap;
use std::fmt;

/// Parse an `HH:MM` time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, DomainError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| DomainError::InvalidTimeOfDay(s.to_string()))
}

/// Daily window during which no job is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn parse(start: &str, end: &str) -> Result<Self, DomainError> {
        Ok(Self {
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
        })
    }

    /// Both bounds are inclusive; `start > end` wraps past midnight.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start > self.end {
            now >= self.start || now <= self.end
        } else {
            self.start <= now && now <= self.end
        }
    }
}

/// Global and per-backend Running ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    pub total: usize,
    pub per_backend: BTreeMap<String, usize>,
    /// Ceiling for backends without an explicit entry.
    pub fallback: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        let per_backend = [("bridge", 1), ("openrouter", 2), ("ollama", 1)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            total: 1,
            per_backend,
            fallback: 1,
        }
    }
}

impl ConcurrencyLimits {
    pub fn for_backend(&self, backend: &str) -> usize {
        self.per_backend.get(backend).copied().unwrap_or(self.fallback)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit,
    QuietHours,
    GlobalCeiling { running: usize, limit: usize },
    BackendCeiling { backend: String, running: usize, limit: usize },
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admit)
    }
}

impl fmt::Display for AdmissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionDecision::Admit => write!(f, "admitted"),
            AdmissionDecision::QuietHours => write!(f, "quiet hours active"),
            AdmissionDecision::GlobalCeiling { running, limit } => {
                write!(f, "global ceiling reached ({running}/{limit})")
            }
            AdmissionDecision::BackendCeiling {
                backend,
                running,
                limit,
            } => write!(f, "backend '{backend}' ceiling reached ({running}/{limit})"),
        }
    }
}

/// Pure admission rules; the caller supplies the clock and running counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePolicy {
    pub quiet_hours: Option<QuietHours>,
    pub limits: ConcurrencyLimits,
}

impl SchedulePolicy {
    pub fn admission(
        &self,
        now: NaiveTime,
        total_running: usize,
        backend: &str,
        backend_running: usize,
    ) -> AdmissionDecision {
        if self.quiet_hours.is_some_and(|q| q.contains(now)) {
            return AdmissionDecision::QuietHours;
        }
        if total_running >= self.limits.total {
            return AdmissionDecision::GlobalCeiling {
                running: total_running,
                limit: self.limits.total,
            };
        }
        let limit = self.limits.for_backend(backend);
        if backend_running >= limit {
            return AdmissionDecision::BackendCeiling {
                backend: backend.to_string(),
                running: backend_running,
                limit,
            };
        }
        AdmissionDecision::Admit
    }
}

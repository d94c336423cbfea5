//! Schedule Jobs use case.
//!
//! [`JobScheduler`] is the admission gate between Pending and Running. It
//! tracks which jobs currently run on which backend and asks the pure
//! [`SchedulePolicy`] whether one more may start.

use crate::ports::clock::Clock;
use relay_domain::{AdmissionDecision, SchedulePolicy};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Snapshot of scheduler state for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running_total: usize,
    pub running_by_backend: BTreeMap<String, usize>,
    pub quiet_hours_active: bool,
    pub limit_total: usize,
}

/// Admission gate for job starts.
pub struct JobScheduler {
    policy: RwLock<SchedulePolicy>,
    clock: Arc<dyn Clock>,
    /// job id -> backend
    running: Mutex<HashMap<String, String>>,
}

impl JobScheduler {
    pub fn new(policy: SchedulePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy: RwLock::new(policy),
            clock,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `job_id` could start on `backend` right now.
    ///
    /// A job that is already running is always admitted.
    pub fn can_run_now(&self, job_id: &str, backend: &str) -> AdmissionDecision {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.contains_key(job_id) {
            return AdmissionDecision::Admit;
        }
        self.decide(&running, backend)
    }

    /// Check and claim a Running slot in one step.
    pub fn try_admit(&self, job_id: &str, backend: &str) -> AdmissionDecision {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.contains_key(job_id) {
            return AdmissionDecision::Admit;
        }
        let decision = self.decide(&running, backend);
        if decision.is_admitted() {
            running.insert(job_id.to_string(), backend.to_string());
            debug!("Admitted job {} on '{}' ({} running)", job_id, backend, running.len());
        } else {
            debug!("Job {} held: {}", job_id, decision);
        }
        decision
    }

    /// Free the slot held by `job_id`. Releasing an unknown job is a no-op.
    pub fn release(&self, job_id: &str) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(backend) = running.remove(job_id) {
            debug!("Released job {} from '{}'", job_id, backend);
        }
    }

    /// Move a job's slot to another backend (failover).
    ///
    /// The target backend goes through the same admission check as a new
    /// start, with the job's current slot left out of the counts. A refused
    /// move leaves the slot where it was.
    pub fn reassign(&self, job_id: &str, backend: &str) -> AdmissionDecision {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let previous = running.remove(job_id);
        let decision = self.decide(&running, backend);
        let slot = if decision.is_admitted() {
            debug!("Reassigned job {} to '{}'", job_id, backend);
            Some(backend.to_string())
        } else {
            debug!("Job {} kept off '{}': {}", job_id, backend, decision);
            previous
        };
        if let Some(slot) = slot {
            running.insert(job_id.to_string(), slot);
        }
        decision
    }

    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn running_for(&self, backend: &str) -> usize {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|b| b.as_str() == backend)
            .count()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(job_id)
    }

    /// Replace the policy, e.g. after a config reload.
    pub fn set_policy(&self, policy: SchedulePolicy) {
        *self.policy.write().unwrap_or_else(|e| e.into_inner()) = policy;
    }

    pub fn status(&self) -> SchedulerStatus {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let policy = self.policy.read().unwrap_or_else(|e| e.into_inner());
        let mut running_by_backend = BTreeMap::new();
        for backend in running.values() {
            *running_by_backend.entry(backend.clone()).or_insert(0) += 1;
        }
        SchedulerStatus {
            running_total: running.len(),
            running_by_backend,
            quiet_hours_active: policy
                .quiet_hours
                .is_some_and(|q| q.contains(self.clock.local_time())),
            limit_total: policy.limits.total,
        }
    }

    fn decide(&self, running: &HashMap<String, String>, backend: &str) -> AdmissionDecision {
        let policy = self.policy.read().unwrap_or_else(|e| e.into_inner());
        let on_backend = running.values().filter(|b| b.as_str() == backend).count();
        policy.admission(self.clock.local_time(), running.len(), backend, on_backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveTime, Utc};
    use relay_domain::{ConcurrencyLimits, QuietHours};

    struct FixedClock(NaiveTime);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }

        fn local_time(&self) -> NaiveTime {
            self.0
        }
    }

    fn at(hhmm: &str) -> Arc<dyn Clock> {
        Arc::new(FixedClock(NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap()))
    }

    fn limits(total: usize) -> SchedulePolicy {
        SchedulePolicy {
            quiet_hours: None,
            limits: ConcurrencyLimits {
                total,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_backend_ceiling_blocks_second_job() {
        let scheduler = JobScheduler::new(limits(4), at("12:00"));
        assert!(scheduler.try_admit("a", "bridge").is_admitted());
        assert_eq!(
            scheduler.try_admit("b", "bridge"),
            AdmissionDecision::BackendCeiling {
                backend: "bridge".to_string(),
                running: 1,
                limit: 1
            }
        );
        assert!(scheduler.try_admit("c", "openrouter").is_admitted());
        assert_eq!(scheduler.running_for("bridge"), 1);

        scheduler.release("a");
        assert!(scheduler.can_run_now("b", "bridge").is_admitted());
    }

    #[test]
    fn test_global_ceiling() {
        let scheduler = JobScheduler::new(SchedulePolicy::default(), at("12:00"));
        assert!(scheduler.try_admit("a", "openrouter").is_admitted());
        assert!(matches!(
            scheduler.try_admit("b", "openrouter"),
            AdmissionDecision::GlobalCeiling { running: 1, limit: 1 }
        ));
        assert_eq!(scheduler.running_count(), 1);
    }

    #[test]
    fn test_quiet_hours_block_new_starts_only() {
        let policy = SchedulePolicy {
            quiet_hours: Some(QuietHours::parse("22:00", "06:00").unwrap()),
            limits: ConcurrencyLimits::default(),
        };
        let scheduler = JobScheduler::new(policy, at("23:30"));
        assert_eq!(scheduler.try_admit("a", "bridge"), AdmissionDecision::QuietHours);
        assert!(scheduler.status().quiet_hours_active);

        scheduler.set_policy(SchedulePolicy::default());
        assert!(scheduler.try_admit("a", "bridge").is_admitted());
        // already running
        assert!(scheduler.can_run_now("a", "bridge").is_admitted());
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let scheduler = JobScheduler::new(SchedulePolicy::default(), at("12:00"));
        scheduler.release("missing");
        assert_eq!(scheduler.running_count(), 0);
    }

    #[test]
    fn test_reassign_moves_backend_count() {
        let scheduler = JobScheduler::new(limits(4), at("12:00"));
        scheduler.try_admit("a", "bridge");
        assert!(scheduler.reassign("a", "ollama").is_admitted());
        assert_eq!(scheduler.running_for("bridge"), 0);
        assert_eq!(scheduler.status().running_by_backend.get("ollama"), Some(&1));
    }

    #[test]
    fn test_reassign_respects_target_ceiling() {
        let scheduler = JobScheduler::new(limits(4), at("12:00"));
        assert!(scheduler.try_admit("a", "ollama").is_admitted());
        assert!(scheduler.try_admit("b", "bridge").is_admitted());

        assert_eq!(
            scheduler.reassign("b", "ollama"),
            AdmissionDecision::BackendCeiling {
                backend: "ollama".to_string(),
                running: 1,
                limit: 1
            }
        );
        assert_eq!(scheduler.running_for("ollama"), 1);
        assert_eq!(scheduler.running_for("bridge"), 1);
    }

    #[test]
    fn test_reassign_at_global_ceiling_does_not_count_itself() {
        let scheduler = JobScheduler::new(limits(1), at("12:00"));
        assert!(scheduler.try_admit("a", "bridge").is_admitted());
        assert!(scheduler.reassign("a", "ollama").is_admitted());
        assert_eq!(scheduler.running_count(), 1);
    }
}

//! Supervise Jobs use case.
//!
//! [`JobSupervisor`] owns the lifecycle of durable authoring jobs: it admits
//! Pending jobs through the [`JobScheduler`], drives each admitted job with a
//! [`ContinuationEngine`], and applies the retry, failover, watchdog and
//! operator controls (cancel, resume, fork, steer).
//!
//! Every state change is saved to the [`JobStore`] and followed by a
//! `state_changed` event before anything else happens to the job. State
//! changes for one job are serialized, and a change only commits while the
//! stored state still matches the one the caller acted on.
//!
//! A Running or Retrying job is live only while it holds a scheduler slot.
//! Jobs left Running by a dead process are recovered by
//! [`recover_orphans`](JobSupervisor::recover_orphans).

use super::run_continuation::{
    ContinuationContext, ContinuationEngine, ContinuationError, SessionControl, SessionEnd,
};
use super::schedule_jobs::JobScheduler;
use crate::config::SupervisorParams;
use crate::ports::artifact_sink::{ArtifactError, ArtifactSink};
use crate::ports::chat_backend::{BackendError, BackendSet};
use crate::ports::clock::Clock;
use crate::ports::continuation_observer::{ContinuationObserver, ObserverError, TurnReport};
use crate::ports::job_store::{JobStore, StoreError};
use async_trait::async_trait;
use relay_domain::job::build_transplant_summary;
use relay_domain::{
    AuthoringSession, ContinuationPolicy, DomainError, ExtensionOutcome, Job, JobEvent,
    JobEventKind, JobSpec, JobState, TurnVerdict,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Artifact holding the accumulated document.
pub const OUTPUT_ARTIFACT: &str = "output";
/// Optional planning artifacts carried into forks.
pub const PLAN_ARTIFACT: &str = "plan";
pub const OUTLINE_ARTIFACT: &str = "outline";

/// Errors raised by supervisor operations
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Job {id} cannot be {action} while {state}")]
    InvalidState {
        id: String,
        state: JobState,
        action: &'static str,
    },

    #[error("Job {id} changed to {found} (expected {expected})")]
    Conflict {
        id: String,
        expected: JobState,
        found: JobState,
    },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

impl SupervisorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SupervisorError::Store(StoreError::NotFound(_)))
    }
}

/// Releases a scheduler slot when a run ends, however it ends.
struct AdmissionGuard<'a> {
    scheduler: &'a JobScheduler,
    job_id: &'a str,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.scheduler.release(self.job_id);
    }
}

/// Job lifecycle owner.
pub struct JobSupervisor {
    store: Arc<dyn JobStore>,
    artifacts: Arc<dyn ArtifactSink>,
    backends: BackendSet,
    scheduler: Arc<JobScheduler>,
    clock: Arc<dyn Clock>,
    params: SupervisorParams,
    policy: ContinuationPolicy,
    controls: Mutex<HashMap<String, Arc<SessionControl>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobSupervisor {
    pub fn new(
        store: Arc<dyn JobStore>,
        artifacts: Arc<dyn ArtifactSink>,
        backends: BackendSet,
        scheduler: Arc<JobScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            artifacts,
            backends,
            scheduler,
            clock,
            params: SupervisorParams::default(),
            policy: ContinuationPolicy::default(),
            controls: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_params(mut self, params: SupervisorParams) -> Self {
        self.params = params;
        self
    }

    /// Base continuation policy; per-job overrides apply on top.
    pub fn with_policy(mut self, policy: ContinuationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.names()
    }

    // ==================== Queries ====================

    pub async fn get(&self, job_id: &str) -> Result<Job, SupervisorError> {
        Ok(self.store.load(job_id).await?)
    }

    pub async fn list(&self) -> Result<Vec<Job>, SupervisorError> {
        Ok(self.store.list().await?)
    }

    pub async fn events(&self, job_id: &str) -> Result<Vec<JobEvent>, SupervisorError> {
        self.store.load(job_id).await?;
        Ok(self.store.events(job_id).await?)
    }

    // ==================== Operator Commands ====================

    /// Create a Pending job.
    pub async fn submit(
        &self,
        name: impl Into<String>,
        spec: JobSpec,
        backend: impl Into<String>,
    ) -> Result<Job, SupervisorError> {
        let backend = backend.into();
        self.ensure_backend(&backend)?;
        if let Some(fallback) = &spec.fallback_backend
            && self.backends.get(fallback).is_none()
        {
            warn!("Fallback backend '{}' is not configured; failover disabled", fallback);
        }

        let job = Job::new(new_job_id(), name, spec, backend, self.clock.now());
        self.store.save(&job).await?;
        self.log(
            self.event(JobEventKind::JobSubmitted, &job.id)
                .with("backend", job.backend.clone())
                .with("model", job.spec.model.clone()),
        )
        .await?;
        info!("Submitted job {} ({}) on '{}'", job.id, job.name, job.backend);
        Ok(job)
    }

    /// Request cancellation.
    ///
    /// A live job stops at its next turn boundary; any other non-terminal
    /// job, including one whose driver is gone, is cancelled immediately.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, SupervisorError> {
        let _lock = self.lock_job(job_id).await;
        let mut job = self.store.load(job_id).await?;
        match job.state {
            JobState::Running | JobState::Retrying if self.scheduler.is_running(job_id) => {
                self.control_for(job_id).cancel();
                info!("Cancellation requested for running job {}", job_id);
                Ok(job)
            }
            state if state.is_terminal() => {
                Err(SupervisorError::InvalidState {
                    id: job.id,
                    state,
                    action: "cancelled",
                })
            }
            _ => {
                self.commit_state(&mut job, JobState::Cancelled).await?;
                self.log(self.event(JobEventKind::JobCancelled, job_id)).await?;
                self.drop_control(job_id);
                Ok(job)
            }
        }
    }

    /// Return a Stalled, Failed or Cancelled job to Pending.
    ///
    /// An override queued with [`steer`](Self::steer) survives the resume.
    pub async fn resume(&self, job_id: &str) -> Result<Job, SupervisorError> {
        let _lock = self.lock_job(job_id).await;
        let mut job = self.store.load(job_id).await?;
        if !job.state.is_resumable() {
            return Err(SupervisorError::InvalidState {
                id: job.id,
                state: job.state,
                action: "resumed",
            });
        }
        let from = job.state;
        job.last_error = None;
        job.retries = 0;
        self.commit_state(&mut job, JobState::Pending).await?;
        self.log(self.event(JobEventKind::JobResumed, job_id).with("from", from.as_str()))
            .await?;
        info!("Resumed job {} from {}", job_id, from);
        Ok(job)
    }

    /// Create a Pending child job carrying the parent's spec and artifacts.
    pub async fn fork(
        &self,
        job_id: &str,
        backend: Option<String>,
    ) -> Result<Job, SupervisorError> {
        let parent = self.store.load(job_id).await?;
        if let Some(backend) = &backend {
            self.ensure_backend(backend)?;
        }

        let plan = self.artifacts.read(job_id, PLAN_ARTIFACT)?;
        let outline = self.artifacts.read(job_id, OUTLINE_ARTIFACT)?;
        let output = self.artifacts.read(job_id, OUTPUT_ARTIFACT)?;
        let summary = build_transplant_summary(
            plan.as_deref(),
            outline.as_deref(),
            output.as_deref(),
            self.params.transplant_chars,
        );

        let mut child = parent.fork(new_job_id(), backend, summary, self.clock.now());
        for kind in parent.artifacts.keys() {
            match self.artifacts.copy(job_id, &child.id, kind)? {
                Some(path) => {
                    child.artifacts.insert(kind.clone(), path);
                }
                None => {
                    child.artifacts.remove(kind);
                }
            }
        }
        self.store.save(&child).await?;

        self.log(
            self.event(JobEventKind::JobForked, &child.id)
                .with("parent_id", parent.id.clone())
                .with("backend", child.backend.clone()),
        )
        .await?;
        self.log(self.event(JobEventKind::JobForked, &parent.id).with("child_id", child.id.clone()))
            .await?;
        info!("Forked job {} into {} on '{}'", parent.id, child.id, child.backend);
        Ok(child)
    }

    /// Queue a one-shot prompt for the job's next generating turn.
    pub async fn steer(&self, job_id: &str, text: &str) -> Result<Job, SupervisorError> {
        let job = self.store.load(job_id).await?;
        if job.state.is_terminal() && !job.state.is_resumable() {
            return Err(SupervisorError::InvalidState {
                id: job.id,
                state: job.state,
                action: "steered",
            });
        }
        self.control_for(job_id).steer(text);
        self.log(
            self.event(JobEventKind::NextOverrideQueued, job_id)
                .with("chars", text.chars().count()),
        )
        .await?;
        Ok(job)
    }

    // ==================== Scheduling ====================

    /// Admit as many Pending jobs as the scheduler allows and spawn their runs.
    ///
    /// Returns the ids of the jobs started.
    pub async fn admit_pending(self: &Arc<Self>) -> Result<Vec<String>, SupervisorError> {
        let mut started = Vec::new();
        for job in self.store.list().await? {
            if job.state != JobState::Pending {
                continue;
            }
            if !self.start(&job.id).await? {
                continue;
            }
            let supervisor = Arc::clone(self);
            let job_id = job.id.clone();
            tokio::spawn(async move {
                if let Err(e) = supervisor.run(&job_id).await {
                    warn!("Job {} run aborted: {}", job_id, e);
                }
            });
            started.push(job.id);
        }
        Ok(started)
    }

    /// Claim a scheduler slot and move a Pending job to Running.
    ///
    /// Returns `false` when the admission gate holds the job back.
    pub async fn start(&self, job_id: &str) -> Result<bool, SupervisorError> {
        let _lock = self.lock_job(job_id).await;
        let mut job = self.store.load(job_id).await?;
        if job.state != JobState::Pending {
            return Ok(false);
        }
        if !self.scheduler.try_admit(&job.id, &job.backend).is_admitted() {
            return Ok(false);
        }
        if let Err(e) = self.commit_state(&mut job, JobState::Running).await {
            self.scheduler.release(job_id);
            return Err(e);
        }
        self.control_for(job_id);
        self.log(self.event(JobEventKind::JobStarted, job_id).with("backend", job.backend.clone()))
            .await?;
        info!("Started job {} on '{}'", job_id, job.backend);
        Ok(true)
    }

    /// Stall every Running or Retrying job that holds no scheduler slot.
    ///
    /// Such a job has no driver, typically because the process that ran it
    /// exited. Returns the ids of the jobs moved to Stalled.
    pub async fn recover_orphans(&self) -> Result<Vec<String>, SupervisorError> {
        let mut recovered = Vec::new();
        for listed in self.store.list().await? {
            if !is_active(listed.state) || self.scheduler.is_running(&listed.id) {
                continue;
            }
            let _lock = self.lock_job(&listed.id).await;
            let mut job = self.store.load(&listed.id).await?;
            if !is_active(job.state) || self.scheduler.is_running(&job.id) {
                continue;
            }
            let from = job.state;
            job.last_error = Some(format!("no live driver for {from} job"));
            self.commit_state(&mut job, JobState::Stalled).await?;
            self.log(
                self.event(JobEventKind::WatchdogTimeout, &job.id)
                    .with("reason", "orphaned")
                    .with("from", from.as_str()),
            )
            .await?;
            warn!("Job {} was {} with no driver; stalled", job.id, from);
            recovered.push(job.id);
        }
        Ok(recovered)
    }

    /// Drive one admitted job until it leaves Running.
    ///
    /// Returns the state the job ended in. The scheduler slot is released
    /// on every exit path.
    pub async fn run(&self, job_id: &str) -> Result<JobState, SupervisorError> {
        let _slot = AdmissionGuard {
            scheduler: &self.scheduler,
            job_id,
        };
        let control = self.control_for(job_id);

        let result = self.drive(job_id, &control).await;
        self.drop_control(job_id);

        let state = match result {
            Ok(state) => state,
            Err(SupervisorError::Conflict { found, .. }) => {
                info!("Job {} was moved to {} while running; stopping", job_id, found);
                found
            }
            Err(e) => {
                warn!("Job {} failed outside a turn: {}", job_id, e);
                self.fail_quietly(job_id, &e.to_string()).await;
                return Err(e);
            }
        };
        self.log(self.event(JobEventKind::JobEnded, job_id).with("state", state.as_str()))
            .await?;
        info!("Job {} ended in {}", job_id, state);
        Ok(state)
    }

    async fn drive(
        &self,
        job_id: &str,
        control: &SessionControl,
    ) -> Result<JobState, SupervisorError> {
        let mut job = self.store.load(job_id).await?;
        if job.state != JobState::Running {
            return Err(SupervisorError::InvalidState {
                id: job.id,
                state: job.state,
                action: "run",
            });
        }

        let output_path = self.artifacts.locate(job_id, OUTPUT_ARTIFACT)?;
        if job.artifacts.get(OUTPUT_ARTIFACT) != Some(&output_path) {
            job.artifacts.insert(OUTPUT_ARTIFACT.to_string(), output_path.clone());
            self.save_unchanged(&job).await?;
        }

        let output = self.artifacts.read(job_id, OUTPUT_ARTIFACT)?.unwrap_or_default();
        let resumed_at = self.last_chunk_index(job_id).await?;
        if resumed_at > 0 {
            info!("Job {} continues after chunk {}", job_id, resumed_at);
        }
        let mut session = AuthoringSession::resume_from(output, resumed_at);

        let policy = job.spec.continuation.apply(&self.policy);
        let recorder = JobTurnRecorder {
            supervisor: self,
            job_id,
        };
        let mut attempt = 0u32;
        let mut failed_over = false;

        loop {
            let backend = self
                .backends
                .get(&job.backend)
                .ok_or_else(|| SupervisorError::UnknownBackend(job.backend.clone()))?;
            let engine = ContinuationEngine::new(backend).with_turn_timeout(self.params.watchdog);
            let ctx = ContinuationContext {
                model: job.spec.model.clone(),
                system_prompt: job.effective_system_prompt(),
                bridge_session_id: job.spec.bridge_session_id.clone(),
                bridge_message_id: job.spec.bridge_message_id.clone(),
                max_turns: job.spec.max_chunks,
                policy: policy.clone(),
            };

            let error = match engine.run(&mut session, &ctx, control, &recorder).await {
                Ok(SessionEnd::Finished { .. }) | Ok(SessionEnd::BudgetExhausted)
                    if control.is_cancelled() =>
                {
                    return self.finish_cancelled(&mut job).await;
                }
                Ok(SessionEnd::Finished { .. }) | Ok(SessionEnd::BudgetExhausted) => {
                    self.set_state(&mut job, JobState::Done).await?;
                    self.log(
                        self.event(JobEventKind::JobCompleted, job_id)
                            .with("final", output_path.clone())
                            .with("chunks", session.turns_completed()),
                    )
                    .await?;
                    return Ok(JobState::Done);
                }
                Ok(SessionEnd::Paused { score }) => {
                    job.last_error = Some(format!("repetition {score:.2} above threshold"));
                    self.set_state(&mut job, JobState::Stalled).await?;
                    self.log(self.event(JobEventKind::JobPaused, job_id).with("score", score))
                        .await?;
                    return Ok(JobState::Stalled);
                }
                Ok(SessionEnd::Cancelled) => {
                    return self.finish_cancelled(&mut job).await;
                }
                Err(ContinuationError::TurnTimeout(limit)) => {
                    warn!("Job {} made no progress for {}s; stalling", job_id, limit.as_secs());
                    self.log(
                        self.event(JobEventKind::WatchdogTimeout, job_id)
                            .with("secs", limit.as_secs()),
                    )
                    .await?;
                    job.last_error = Some(format!("watchdog timeout after {}s", limit.as_secs()));
                    self.set_state(&mut job, JobState::Stalled).await?;
                    return Ok(JobState::Stalled);
                }
                Err(ContinuationError::Backend(e)) => e,
                Err(other) => {
                    return self.finish_failed(&mut job, &other.to_string()).await;
                }
            };

            let retriable = error.is_retriable();
            self.log(
                self.event(JobEventKind::RetryDecision, job_id)
                    .with("error", error.to_string())
                    .with("retriable", retriable)
                    .with("attempt", attempt),
            )
            .await?;
            if !retriable {
                return self.finish_failed(&mut job, &error.to_string()).await;
            }

            if attempt < self.params.max_retries {
                attempt += 1;
                let delay = self.params.backoff_for(attempt);
                job.retries += 1;
                job.last_error = Some(error.to_string());
                self.set_state(&mut job, JobState::Retrying).await?;
                self.log(
                    self.event(JobEventKind::Retry, job_id)
                        .with("attempt", attempt)
                        .with("delay_ms", delay.as_millis() as u64)
                        .with("error", error.to_string()),
                )
                .await?;
                warn!(
                    "Job {} retry {}/{} in {:?}: {}",
                    job_id, attempt, self.params.max_retries, delay, error
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = control.cancelled() => {
                        return self.finish_cancelled(&mut job).await;
                    }
                }
                self.set_state(&mut job, JobState::Running).await?;
                continue;
            }

            if let Some(fallback) = self.failover_target(&job, failed_over) {
                let decision = self.scheduler.reassign(job_id, &fallback);
                if !decision.is_admitted() {
                    warn!(
                        "Job {} cannot fail over from '{}' to '{}': {}",
                        job_id, job.backend, fallback, decision
                    );
                    self.log(
                        self.event(JobEventKind::Failover, job_id)
                            .with("from", job.backend.clone())
                            .with("backend", fallback.clone())
                            .with("refused", decision.to_string()),
                    )
                    .await?;
                    job.last_error =
                        Some(format!("{error}; failover to '{fallback}' held: {decision}"));
                    self.set_state(&mut job, JobState::Stalled).await?;
                    return Ok(JobState::Stalled);
                }

                failed_over = true;
                attempt = 0;
                let from = std::mem::replace(&mut job.backend, fallback.clone());
                self.save_unchanged(&job).await?;
                self.log(
                    self.event(JobEventKind::Failover, job_id)
                        .with("from", from.clone())
                        .with("backend", fallback.clone()),
                )
                .await?;
                warn!("Job {} failing over from '{}' to '{}'", job_id, from, fallback);
                continue;
            }

            return self.finish_failed(&mut job, &error.to_string()).await;
        }
    }

    // ==================== Helpers ====================

    fn failover_target(&self, job: &Job, failed_over: bool) -> Option<String> {
        if failed_over {
            return None;
        }
        job.spec
            .fallback_backend
            .clone()
            .filter(|fb| fb != &job.backend && self.backends.get(fb).is_some())
    }

    async fn finish_cancelled(&self, job: &mut Job) -> Result<JobState, SupervisorError> {
        self.set_state(job, JobState::Cancelled).await?;
        self.log(self.event(JobEventKind::JobCancelled, &job.id)).await?;
        Ok(JobState::Cancelled)
    }

    async fn finish_failed(&self, job: &mut Job, error: &str) -> Result<JobState, SupervisorError> {
        warn!("Job {} failed: {}", job.id, error);
        job.last_error = Some(error.to_string());
        self.set_state(job, JobState::Failed).await?;
        self.log(self.event(JobEventKind::JobFailed, &job.id).with("error", error))
            .await?;
        Ok(JobState::Failed)
    }

    /// Best effort: mark a job Failed after an infrastructure error.
    async fn fail_quietly(&self, job_id: &str, error: &str) {
        let Ok(mut job) = self.store.load(job_id).await else {
            return;
        };
        if !job.state.can_transition(JobState::Failed) {
            return;
        }
        if self.finish_failed(&mut job, error).await.is_ok() {
            let _ = self
                .log(self.event(JobEventKind::JobEnded, job_id).with("state", "FAILED"))
                .await;
        }
    }

    /// Serialize state changes for one job.
    async fn lock_job(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(job_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Fail with [`SupervisorError::Conflict`] if the stored state moved
    /// away from `job.state`.
    async fn ensure_unchanged(&self, job: &Job) -> Result<(), SupervisorError> {
        let stored = self.store.load(&job.id).await?;
        if stored.state != job.state {
            return Err(SupervisorError::Conflict {
                id: job.id.clone(),
                expected: job.state,
                found: stored.state,
            });
        }
        Ok(())
    }

    /// Save a record whose state is unchanged.
    async fn save_unchanged(&self, job: &Job) -> Result<(), SupervisorError> {
        let _lock = self.lock_job(&job.id).await;
        self.ensure_unchanged(job).await?;
        Ok(self.store.save(job).await?)
    }

    async fn set_state(&self, job: &mut Job, to: JobState) -> Result<(), SupervisorError> {
        let _lock = self.lock_job(&job.id).await;
        self.commit_state(job, to).await
    }

    /// Apply a transition, persist the job, then log `state_changed`.
    ///
    /// The caller holds the job's lock.
    async fn commit_state(&self, job: &mut Job, to: JobState) -> Result<(), SupervisorError> {
        self.ensure_unchanged(job).await?;
        let from = job.transition(to, self.clock.now())?;
        self.store.save(job).await?;
        self.log(
            self.event(JobEventKind::StateChanged, &job.id)
                .with("from", from.as_str())
                .with("to", to.as_str()),
        )
        .await?;
        debug!("Job {}: {} -> {}", job.id, from, to);
        Ok(())
    }

    fn event(&self, kind: JobEventKind, job_id: &str) -> JobEvent {
        JobEvent::new(kind, job_id, self.clock.now())
    }

    async fn log(&self, event: JobEvent) -> Result<(), SupervisorError> {
        Ok(self.store.append_event(&event).await?)
    }

    fn ensure_backend(&self, backend: &str) -> Result<(), SupervisorError> {
        match self.backends.get(backend) {
            Some(_) => Ok(()),
            None => Err(SupervisorError::UnknownBackend(backend.to_string())),
        }
    }

    async fn last_chunk_index(&self, job_id: &str) -> Result<u32, SupervisorError> {
        let last = self
            .store
            .events(job_id)
            .await?
            .iter()
            .filter(|e| e.kind == JobEventKind::ChunkDone)
            .filter_map(|e| e.get("idx").and_then(|v| v.as_u64()))
            .max()
            .unwrap_or(0);
        Ok(u32::try_from(last).unwrap_or(u32::MAX))
    }

    fn control_for(&self, job_id: &str) -> Arc<SessionControl> {
        let mut controls = self.controls.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(controls.entry(job_id.to_string()).or_default())
    }

    fn drop_control(&self, job_id: &str) {
        self.controls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(job_id);
    }
}

/// States that need a live driver.
fn is_active(state: JobState) -> bool {
    matches!(state, JobState::Running | JobState::Retrying)
}

fn new_job_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Persists turn output and progress events for one job.
struct JobTurnRecorder<'a> {
    supervisor: &'a JobSupervisor,
    job_id: &'a str,
}

impl JobTurnRecorder<'_> {
    async fn emit(&self, event: JobEvent) {
        if let Err(e) = self.supervisor.log(event).await {
            warn!("Job {}: failed to append event: {}", self.job_id, e);
        }
    }

    fn event(&self, kind: JobEventKind) -> JobEvent {
        self.supervisor.event(kind, self.job_id)
    }
}

#[async_trait]
impl ContinuationObserver for JobTurnRecorder<'_> {
    async fn on_turn(
        &self,
        report: &TurnReport,
        session: &AuthoringSession,
    ) -> Result<(), ObserverError> {
        self.supervisor
            .artifacts
            .write(self.job_id, OUTPUT_ARTIFACT, session.accumulated_text())?;

        if report.steered {
            self.supervisor
                .log(self.event(JobEventKind::NextHintApplied).with("idx", report.turn))
                .await?;
        }
        self.supervisor
            .log(
                self.event(JobEventKind::ChunkDone)
                    .with("idx", report.turn)
                    .with("bytes", report.body.len())
                    .with("passes", report.extension_passes),
            )
            .await?;
        if let Some(hint) = &report.hint {
            self.supervisor
                .log(self.event(JobEventKind::NextHint).with("hint", hint.clone()))
                .await?;
        }
        if let TurnVerdict::Paused { score } = report.verdict {
            self.supervisor
                .log(
                    self.event(JobEventKind::RepetitionWarning)
                        .with("idx", report.turn)
                        .with("score", score),
                )
                .await?;
        }
        Ok(())
    }

    async fn on_extension(&self, turn: u32, outcome: &ExtensionOutcome) {
        match outcome {
            ExtensionOutcome::Repetitive { score } => {
                self.emit(
                    self.event(JobEventKind::RepetitionGuard)
                        .with("action", "skipped_extend")
                        .with("idx", turn)
                        .with("score", *score),
                )
                .await
            }
            ExtensionOutcome::LowGrowthAbandoned {
                growth,
                min_expected,
            } => {
                self.emit(
                    self.event(JobEventKind::ExtendAbandonedForLowGrowth)
                        .with("idx", turn)
                        .with("growth", *growth)
                        .with("min_expected", *min_expected),
                )
                .await
            }
            ExtensionOutcome::Appended { .. } | ExtensionOutcome::Empty => {}
        }
    }

    async fn on_extension_failed(&self, turn: u32, error: &BackendError) {
        self.emit(
            self.event(JobEventKind::ExtendFailed)
                .with("idx", turn)
                .with("error", error.to_string()),
        )
        .await;
    }
}

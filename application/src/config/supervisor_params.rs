//! Supervisor parameters: job run loop control.
//!
//! [`SupervisorParams`] groups the static parameters that control how
//! [`JobSupervisor`](crate::use_cases::job_supervisor::JobSupervisor) drives
//! jobs: the per-turn watchdog and the retry/backoff policy.

use std::time::Duration;

/// Job run loop control parameters.
#[derive(Debug, Clone)]
pub struct SupervisorParams {
    /// A turn that makes no progress for this long stalls the job.
    pub watchdog: Duration,
    /// Retries of a recoverable backend error before failover or failure.
    pub max_retries: u32,
    /// Retry `n` waits `2^n * backoff_base`.
    pub backoff_base: Duration,
    /// Size cap of the summary injected into forked jobs, in characters.
    pub transplant_chars: usize,
}

impl Default for SupervisorParams {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(300),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            transplant_chars: relay_domain::job::TRANSPLANT_SUMMARY_CHARS,
        }
    }
}

impl SupervisorParams {
    // ==================== Builder Methods ====================

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let params = SupervisorParams::default();
        assert_eq!(params.watchdog, Duration::from_secs(300));
        assert_eq!(params.max_retries, 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let params = SupervisorParams::default().with_backoff_base(Duration::from_millis(10));
        assert_eq!(params.backoff_for(1), Duration::from_millis(20));
        assert_eq!(params.backoff_for(3), Duration::from_millis(80));
    }

    #[test]
    fn test_builder() {
        let params = SupervisorParams::default()
            .with_watchdog(Duration::from_secs(5))
            .with_max_retries(0);
        assert_eq!(params.watchdog, Duration::from_secs(5));
        assert_eq!(params.max_retries, 0);
    }
}

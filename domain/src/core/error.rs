//! Domain error types

use crate::job::entities::JobState;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Invalid time of day '{0}' (expected HH:MM)")]
    InvalidTimeOfDay(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            from: JobState::Done,
            to: JobState::Running,
        };
        assert_eq!(error.to_string(), "Invalid job transition: DONE -> RUNNING");
    }

    #[test]
    fn test_invalid_time_display() {
        let error = DomainError::InvalidTimeOfDay("25:00".to_string());
        assert_eq!(error.to_string(), "Invalid time of day '25:00' (expected HH:MM)");
    }
}

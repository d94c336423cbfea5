//! Port for observing continuation turns.
//!
//! The continuation engine reports every completed turn here. The job
//! supervisor persists output and event-log entries from these callbacks;
//! other callers can ignore them with [`NoContinuationObserver`].

use super::chat_backend::BackendError;
use async_trait::async_trait;
use relay_domain::{AuthoringSession, ExtensionOutcome, TurnVerdict};

/// Error returned by an observer that could not record a turn.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Summary of one completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    /// 1-based turn index within the session.
    pub turn: u32,
    pub prompt: String,
    /// The prompt was an operator override rather than an anchor.
    pub steered: bool,
    /// The turn's text after directive stripping and extension.
    pub body: String,
    pub hint: Option<String>,
    pub extension_passes: u32,
    pub repetition_score: f64,
    pub verdict: TurnVerdict,
}

/// Receives continuation progress.
#[async_trait]
pub trait ContinuationObserver: Send + Sync {
    /// Called after a turn was committed to the session.
    ///
    /// An error aborts the session: output that cannot be recorded must not
    /// be built upon.
    async fn on_turn(&self, report: &TurnReport, session: &AuthoringSession) -> Result<(), ObserverError>;

    /// Called for every extension reply folded into a turn.
    async fn on_extension(&self, _turn: u32, _outcome: &ExtensionOutcome) {}

    /// Called when an extension request failed; extension stops for the turn.
    async fn on_extension_failed(&self, _turn: u32, _error: &BackendError) {}
}

/// No-op implementation for tests and ad-hoc sessions.
pub struct NoContinuationObserver;

#[async_trait]
impl ContinuationObserver for NoContinuationObserver {
    async fn on_turn(&self, _report: &TurnReport, _session: &AuthoringSession) -> Result<(), ObserverError> {
        Ok(())
    }
}

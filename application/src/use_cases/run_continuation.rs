//! Run Continuation use case.
//!
//! Drives one [`AuthoringSession`] turn by turn against a [`ChatBackend`]:
//! derive the prompt (BEGIN, operator override, anchor or plain continue),
//! extend short turns within their subtopic, then evaluate the turn for
//! repetition and end markers.
//!
//! A turn is applied to the session only once it fully completed, so a turn
//! abandoned by the watchdog or cancelled mid-flight leaves the session as it
//! was before the turn started.

use crate::ports::chat_backend::{BackendError, ChatBackend};
use crate::ports::continuation_observer::{ContinuationObserver, ObserverError, TurnReport};
use relay_domain::util::truncate_str;
use relay_domain::{
    AuthoringPhase, AuthoringSession, ChatCompletionRequest, ChatMessage, ContinuationPolicy,
    DomainError, TurnDraft, TurnVerdict,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that can end a continuation run early
#[derive(Error, Debug)]
pub enum ContinuationError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Turn made no progress within {} seconds", .0.as_secs())]
    TurnTimeout(Duration),

    #[error("Session error: {0}")]
    Session(#[from] DomainError),

    #[error("Failed to record turn: {0}")]
    Observer(ObserverError),
}

/// How a run ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// The model emitted a terminal marker.
    Finished { marker: String },
    /// Repetition auto-paused the session.
    Paused { score: f64 },
    /// Cancellation was observed at a turn boundary.
    Cancelled,
    /// The turn budget ran out.
    BudgetExhausted,
}

/// Per-session request parameters.
#[derive(Debug, Clone)]
pub struct ContinuationContext {
    pub model: String,
    pub system_prompt: String,
    pub bridge_session_id: Option<String>,
    pub bridge_message_id: Option<String>,
    /// Total turns the session may complete.
    pub max_turns: u32,
    pub policy: ContinuationPolicy,
}

impl ContinuationContext {
    fn request(&self, prompt: &str) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if !self.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.push(ChatMessage::user(prompt));
        ChatCompletionRequest::new(self.model.clone(), messages)
            .with_bridge_ids(self.bridge_session_id.clone(), self.bridge_message_id.clone())
    }
}

/// Operator controls shared with a running session.
#[derive(Debug, Default)]
pub struct SessionControl {
    cancel: CancellationToken,
    next_override: Mutex<Option<String>>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop at the next turn boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once cancellation was requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Queue a one-shot prompt for the next turn, replacing any queued one.
    pub fn steer(&self, text: impl Into<String>) {
        *self.next_override.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.into());
    }

    fn take_override(&self) -> Option<String> {
        self.next_override
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

/// Use case driving an authoring session.
pub struct ContinuationEngine {
    backend: Arc<dyn ChatBackend>,
    turn_timeout: Option<Duration>,
}

impl ContinuationEngine {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            turn_timeout: None,
        }
    }

    /// Abandon a turn that takes longer than `timeout`.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run turns until the session finishes, pauses, is cancelled or the
    /// turn budget is spent.
    pub async fn run(
        &self,
        session: &mut AuthoringSession,
        ctx: &ContinuationContext,
        control: &SessionControl,
        observer: &dyn ContinuationObserver,
    ) -> Result<SessionEnd, ContinuationError> {
        info!(
            "Starting continuation on '{}' at turn {} (max {})",
            self.backend.name(),
            session.turns_completed() + 1,
            ctx.max_turns
        );

        loop {
            if control.is_cancelled() {
                info!("Continuation cancelled after {} turns", session.turns_completed());
                return Ok(SessionEnd::Cancelled);
            }
            match session.phase() {
                AuthoringPhase::Finished => {
                    return Ok(SessionEnd::Finished {
                        marker: session.last_hint().unwrap_or_default().to_string(),
                    });
                }
                AuthoringPhase::Paused => {
                    return Ok(SessionEnd::Paused {
                        score: session.repetition_score(),
                    });
                }
                _ => {}
            }
            if session.turns_completed() >= ctx.max_turns {
                info!("Turn budget of {} exhausted", ctx.max_turns);
                return Ok(SessionEnd::BudgetExhausted);
            }
            if let Some(text) = control.take_override() {
                session.set_override(text);
            }

            let report = match self.turn_timeout {
                Some(limit) => tokio::time::timeout(limit, self.run_turn(session, ctx, observer))
                    .await
                    .map_err(|_| ContinuationError::TurnTimeout(limit))??,
                None => self.run_turn(session, ctx, observer).await?,
            };

            observer
                .on_turn(&report, session)
                .await
                .map_err(ContinuationError::Observer)?;

            match report.verdict {
                TurnVerdict::Finished { marker } => {
                    info!("Session finished at turn {} with NEXT: [{}]", report.turn, marker);
                    return Ok(SessionEnd::Finished { marker });
                }
                TurnVerdict::Paused { score } => {
                    warn!(
                        "High repetition detected (Jaccard~{:.2}) at turn {}. Auto-pausing.",
                        score, report.turn
                    );
                    return Ok(SessionEnd::Paused { score });
                }
                TurnVerdict::Continue => {}
            }
        }
    }

    /// Execute exactly one turn, including its extension passes.
    pub async fn run_turn(
        &self,
        session: &mut AuthoringSession,
        ctx: &ContinuationContext,
        observer: &dyn ContinuationObserver,
    ) -> Result<TurnReport, ContinuationError> {
        let policy = &ctx.policy;
        let mut next = session.clone();
        let turn = next.turns_completed() + 1;
        let steered =
            next.phase() == AuthoringPhase::Generating && next.pending_override().is_some();

        let prompt = next.next_prompt(policy)?;
        debug!("Turn {}: prompt {}", turn, truncate_str(&prompt, 120));

        let reply = self.backend.complete(ctx.request(&prompt)).await?;
        let mut draft = TurnDraft::from_reply(&reply);

        if draft.wants_extension(policy) {
            next.begin_extension();
        }
        while draft.wants_extension(policy) {
            let ext_prompt = draft.extension_prompt(policy);
            match self.backend.complete(ctx.request(&ext_prompt)).await {
                Ok(ext_reply) => {
                    let outcome = draft.absorb(&ext_reply, policy);
                    debug!("Turn {}: extension {:?}", turn, outcome);
                    observer.on_extension(turn, &outcome).await;
                }
                Err(e) => {
                    warn!("Turn {}: extension failed: {}", turn, e);
                    observer.on_extension_failed(turn, &e).await;
                    draft.stop();
                }
            }
        }

        let (body, hint, passes) = draft.into_parts();
        let verdict = next.commit_turn(&body, hint.clone(), passes, policy);
        let repetition_score = next.repetition_score();
        *session = next;

        Ok(TurnReport {
            turn,
            prompt,
            steered,
            body,
            hint,
            extension_passes: passes,
            repetition_score,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::continuation_observer::NoContinuationObserver;
    use async_trait::async_trait;
    use relay_domain::ExtensionOutcome;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // ==================== Test Mocks ====================

    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, BackendError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, BackendError>>) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from(replies)),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn ok(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ChatCompletionRequest) -> Result<String, BackendError> {
            let prompt = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Other("No more replies".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        turns: Mutex<Vec<TurnReport>>,
        extensions: Mutex<Vec<ExtensionOutcome>>,
        extension_failures: Mutex<u32>,
    }

    #[async_trait]
    impl ContinuationObserver for RecordingObserver {
        async fn on_turn(&self, report: &TurnReport, _session: &AuthoringSession) -> Result<(), ObserverError> {
            self.turns.lock().unwrap().push(report.clone());
            Ok(())
        }

        async fn on_extension(&self, _turn: u32, outcome: &ExtensionOutcome) {
            self.extensions.lock().unwrap().push(outcome.clone());
        }

        async fn on_extension_failed(&self, _turn: u32, _error: &BackendError) {
            *self.extension_failures.lock().unwrap() += 1;
        }
    }

    fn ctx(max_turns: u32, min_chars: usize) -> ContinuationContext {
        ContinuationContext {
            model: "model-x".to_string(),
            system_prompt: "Write a manual.".to_string(),
            bridge_session_id: None,
            bridge_message_id: None,
            max_turns,
            policy: ContinuationPolicy {
                min_chars,
                ..Default::default()
            },
        }
    }

    const PARAGRAPH: &str = "Soil structure governs how water moves through a field, and \
aggregates formed by roots and fungi keep pores open during heavy rain. \
Compaction from machinery collapses those pores and water then runs off.";

    // ==================== Turn Prompts ====================

    #[tokio::test]
    async fn test_begin_then_anchor_prompts() {
        let backend = Arc::new(ScriptedBackend::ok(&[
            "Chapter one ends here.\nNEXT: [Chapter 2]",
            "Chapter two text.\nNEXT: [END]",
        ]));
        let engine = ContinuationEngine::new(backend.clone());
        let mut session = AuthoringSession::new();
        let observer = RecordingObserver::default();

        let end = engine
            .run(&mut session, &ctx(10, 0), &SessionControl::new(), &observer)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::Finished { marker: "END".to_string() });
        let prompts = backend.prompts();
        assert_eq!(prompts[0], "BEGIN");
        assert!(prompts[1].contains("<<<ANCHOR\nChapter one ends here.\nANCHOR>>>"));
        assert!(!prompts[1].contains("Chapter 2"));
        assert_eq!(
            session.accumulated_text(),
            "Chapter one ends here.\n\nChapter two text."
        );
        assert_eq!(observer.turns.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_override_used_once() {
        let backend = Arc::new(ScriptedBackend::ok(&["First.", "Second.", "Third."]));
        let engine = ContinuationEngine::new(backend.clone());
        let mut session = AuthoringSession::resume_from("Earlier text.", 1);
        let control = SessionControl::new();
        control.steer("Now cover irrigation.");

        let end = engine
            .run(&mut session, &ctx(3, 0), &control, &NoContinuationObserver)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::BudgetExhausted);
        let prompts = backend.prompts();
        assert_eq!(prompts[0], "Now cover irrigation.");
        assert!(prompts[1].starts_with("Continue exactly from after the following anchor."));
    }

    // ==================== Repetition ====================

    #[tokio::test]
    async fn test_repetitive_turns_auto_pause_once() {
        let near_copy = PARAGRAPH.replace("heavy rain", "heavy rains");
        let backend = Arc::new(ScriptedBackend::ok(&[PARAGRAPH, &near_copy, PARAGRAPH]));
        let engine = ContinuationEngine::new(backend.clone());
        let mut session = AuthoringSession::new();
        let observer = RecordingObserver::default();

        let end = engine
            .run(&mut session, &ctx(10, 0), &SessionControl::new(), &observer)
            .await
            .unwrap();

        assert!(matches!(end, SessionEnd::Paused { score } if score > 0.35));
        assert_eq!(backend.prompts().len(), 2);
        assert_eq!(session.turns_completed(), 2);

        let turns = observer.turns.lock().unwrap();
        let warnings = turns
            .iter()
            .filter(|t| matches!(t.verdict, TurnVerdict::Paused { .. }))
            .count();
        assert_eq!(warnings, 1);
        assert_eq!(turns[0].repetition_score, 0.0);
    }

    // ==================== Extension ====================

    #[tokio::test]
    async fn test_short_turn_is_extended() {
        let backend = Arc::new(ScriptedBackend::ok(&[
            "Opening of the section.\nNEXT: [Part 2]",
            "Irrigation scheduling depends on evapotranspiration estimates and soil moisture sensors placed at root depth.",
            "",
        ]));
        let engine = ContinuationEngine::new(backend.clone());
        let mut session = AuthoringSession::new();
        let observer = RecordingObserver::default();

        let report = engine
            .run_turn(&mut session, &ctx(1, 5000), &observer)
            .await
            .unwrap();

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("Fill to the per-response output limit"));
        assert_eq!(report.extension_passes, 1);
        assert_eq!(report.hint.as_deref(), Some("Part 2"));
        assert!(report.body.starts_with("Opening of the section.\n\nIrrigation"));
        assert_eq!(
            observer.extensions.lock().unwrap().last(),
            Some(&ExtensionOutcome::Empty)
        );
    }

    #[tokio::test]
    async fn test_extension_failure_keeps_turn() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("Short start.".to_string()),
            Err(BackendError::Timeout(360)),
        ]));
        let engine = ContinuationEngine::new(backend);
        let mut session = AuthoringSession::new();
        let observer = RecordingObserver::default();

        let report = engine
            .run_turn(&mut session, &ctx(1, 5000), &observer)
            .await
            .unwrap();
        assert_eq!(report.body, "Short start.");
        assert_eq!(*observer.extension_failures.lock().unwrap(), 1);
        assert_eq!(session.turns_completed(), 1);
    }

    // ==================== Failure & Cancellation ====================

    #[tokio::test]
    async fn test_failed_turn_leaves_session_untouched() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(BackendError::PeerUnavailable)]));
        let engine = ContinuationEngine::new(backend.clone());
        let mut session = AuthoringSession::new();

        let err = engine
            .run(&mut session, &ctx(5, 0), &SessionControl::new(), &NoContinuationObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, ContinuationError::Backend(BackendError::PeerUnavailable)));
        assert_eq!(session.phase(), AuthoringPhase::Seeding);
        assert_eq!(session.turns_completed(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_turn() {
        let backend = Arc::new(ScriptedBackend::ok(&["never sent"]));
        let engine = ContinuationEngine::new(backend.clone());
        let mut session = AuthoringSession::new();
        let control = SessionControl::new();
        control.cancel();

        let end = engine
            .run(&mut session, &ctx(5, 0), &control, &NoContinuationObserver)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Cancelled);
        assert!(backend.prompts().is_empty());
    }

    struct SlowBackend;

    #[async_trait]
    impl ChatBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: ChatCompletionRequest) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_watchdog_abandons_turn() {
        let engine = ContinuationEngine::new(Arc::new(SlowBackend))
            .with_turn_timeout(Duration::from_millis(20));
        let mut session = AuthoringSession::new();

        let err = engine
            .run(&mut session, &ctx(5, 0), &SessionControl::new(), &NoContinuationObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, ContinuationError::TurnTimeout(_)));
        assert_eq!(session.turns_completed(), 0);
    }
}

//! Gateway core: admission, payload routing and response consumption.
//!
//! [`RelayState`] bundles everything the gateway shares across requests (the
//! peer hub, the correlation registry, the rate limiter and the model
//! catalog). Each admitted request becomes a [`RelayCall`], which owns its
//! correlation slot and turns raw peer deliveries into [`CallEvent`]s,
//! running challenge recovery transparently in between.

use super::error::{RelayError, Result};
use super::hub::PeerHub;
use super::protocol::{InboundMessage, OutboundMessage, PeerCommand, PeerDelivery};
use super::rate_limit::RateLimiter;
use super::registry::{CorrelationRegistry, DeliveryOutcome, SlotReceiver};
use crate::catalog::ModelCatalog;
use crate::config::FileConfig;
use crate::security::{bearer_token, constant_time_eq};
use chrono::{DateTime, Utc};
use rand::Rng;
use relay_domain::{
    ChallengeDecision, ChallengeDetector, ChallengeState, ChatCompletionRequest, Completion,
    DecodedEvent, FinishReason, FrameDecoder, ProviderEnvelope, Route, TranslationOptions,
    translate,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Terminal error pushed to every open slot when the peer goes away.
pub const PEER_DISCONNECTED: &str = "Browser disconnected.";

/// Runtime settings derived from the loaded configuration.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub max_channels: usize,
    pub response_timeout: Duration,
    pub api_key: Option<String>,
    pub translation: TranslationOptions,
    pub detector: ChallengeDetector,
    pub max_refresh_attempts: u32,
    pub challenge_backoff: Duration,
    pub rate_burst: usize,
    pub rate_window: Duration,
    pub enable_idle_restart: bool,
    pub idle_restart_timeout: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            max_channels: config.server.max_channels,
            response_timeout: config.server.response_timeout(),
            api_key: config.server.api_key().map(str::to_string),
            translation: config.translator.to_options(),
            detector: config.challenge.detector(),
            max_refresh_attempts: config.challenge.max_refresh_attempts,
            challenge_backoff: config.challenge.backoff(),
            rate_burst: config.rate_limit.burst,
            rate_window: config.rate_limit.window(),
            enable_idle_restart: config.server.enable_idle_restart,
            idle_restart_timeout: Duration::from_secs(config.server.idle_restart_timeout_seconds),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&FileConfig::default())
    }
}

struct Activity {
    at: Instant,
    wall: DateTime<Utc>,
}

/// Shared gateway state, created once at startup.
pub struct RelayState {
    hub: PeerHub,
    registry: Arc<CorrelationRegistry>,
    limiter: RwLock<Arc<RateLimiter>>,
    catalog: ModelCatalog,
    settings: RwLock<RelaySettings>,
    activity: Mutex<Activity>,
}

impl RelayState {
    pub fn new(settings: RelaySettings, catalog: ModelCatalog) -> Self {
        let limiter = RateLimiter::new(settings.rate_burst, settings.rate_window);
        Self {
            hub: PeerHub::new(),
            registry: Arc::new(CorrelationRegistry::new()),
            limiter: RwLock::new(Arc::new(limiter)),
            catalog,
            settings: RwLock::new(settings),
            activity: Mutex::new(Activity {
                at: Instant::now(),
                wall: Utc::now(),
            }),
        }
    }

    pub fn hub(&self) -> &PeerHub {
        &self.hub
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in reloaded settings. Calls already in flight keep theirs.
    pub fn apply_settings(&self, settings: RelaySettings) {
        let limiter = RateLimiter::new(settings.rate_burst, settings.rate_window);
        *self.limiter.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(limiter);
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        info!("Relay settings reloaded");
    }

    /// Record client activity for the idle monitor and health report.
    pub fn touch(&self) {
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        activity.at = Instant::now();
        activity.wall = Utc::now();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner()).wall
    }

    pub fn idle_for(&self) -> Duration {
        self.activity
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .at
            .elapsed()
    }

    /// Admission checks for a client request, in order: peer presence,
    /// channel capacity, the client's burst window, then the API key.
    pub fn gate(&self, client: Option<&str>, authorization: Option<&str>) -> Result<()> {
        self.ensure_capacity()?;
        let limiter = Arc::clone(&self.limiter.read().unwrap_or_else(|e| e.into_inner()));
        if !limiter.check(client.unwrap_or("unknown")) {
            debug!(client, "Rate limit exceeded");
            return Err(RelayError::RateLimited);
        }
        self.authorize(authorization)
    }

    /// Peer presence and channel capacity only; used by internal callers.
    ///
    /// The capacity check is advisory; [`open`](Self::open) reserves the
    /// slot atomically.
    pub fn ensure_capacity(&self) -> Result<()> {
        if !self.hub.is_connected() {
            return Err(RelayError::PeerUnavailable);
        }
        if self.registry.len() >= self.settings().max_channels {
            return Err(RelayError::ServerBusy);
        }
        Ok(())
    }

    pub fn authorize(&self, authorization: Option<&str>) -> Result<()> {
        let Some(expected) = self.settings().api_key else {
            return Ok(());
        };
        let token = authorization
            .and_then(bearer_token)
            .ok_or(RelayError::MissingAuthorization)?;
        if constant_time_eq(token, &expected) {
            Ok(())
        } else {
            Err(RelayError::InvalidApiKey)
        }
    }

    /// Translate `request`, open its slot and push it to the peer.
    pub fn open(self: &Arc<Self>, request: &ChatCompletionRequest) -> Result<RelayCall> {
        let settings = self.settings();
        let entry = self.catalog.endpoint(&request.model);
        let mapping = entry
            .as_ref()
            .and_then(|e| e.choose(&mut random_index));
        let target = self.catalog.target(&request.model);
        let route = Route::resolve(request, mapping, &settings.translation)?
            .with_target(target.target_model_id, target.is_image);
        let envelope = translate(&request.messages, &route, &settings.translation);

        let epoch = self.hub.epoch().ok_or(RelayError::PeerUnavailable)?;
        let id = Uuid::new_v4().to_string();
        let slot = self
            .registry
            .register_bounded(&id, epoch, settings.max_channels)?;
        debug!(
            request_id = %id,
            model = %request.model,
            mode = %route.mode,
            session_id = %route.session_id,
            "Dispatching request to peer"
        );
        self.hub.send(&OutboundMessage::Request {
            request_id: id.clone(),
            payload: envelope.clone(),
        })?;

        Ok(RelayCall {
            state: Arc::clone(self),
            model: request.model.clone(),
            envelope,
            slot,
            decoder: FrameDecoder::new(),
            tail: String::new(),
            challenge: ChallengeState::new(self.hub.challenge_generation()),
            pending: VecDeque::new(),
            finish_reason: None,
            finished: false,
            settings,
        })
    }

    /// Adopt a new peer socket. Slots tied to an older connection fail.
    pub fn peer_connected(&self) -> (u64, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (epoch, rx) = self.hub.connect();
        let failed = self.registry.fail_before(epoch, PEER_DISCONNECTED);
        if failed > 0 {
            warn!(failed, "Failed requests tied to the replaced peer connection");
        }
        (epoch, rx)
    }

    /// The socket for `epoch` closed; fail every open request if it was current.
    pub fn peer_disconnected(&self, epoch: u64) {
        if self.hub.disconnect(epoch) {
            let failed = self.registry.fail_all(PEER_DISCONNECTED);
            if failed > 0 {
                warn!(failed, "Peer disconnected with requests in flight");
            }
        }
    }

    /// Route one text frame received from the peer.
    pub fn handle_inbound(&self, text: &str) {
        let message: InboundMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Invalid message from peer: {e}");
                return;
            }
        };

        if let Some(command) = message.command.as_deref() {
            if command == "refresh" {
                let generation = self.hub.reset_challenges();
                info!(generation, "Peer reported a refresh; challenge counters reset");
            } else {
                info!(command, "Peer command received");
            }
            return;
        }

        let (Some(request_id), Some(data)) = (message.request_id, message.data) else {
            warn!("Peer message without request_id or data");
            return;
        };
        let delivery = PeerDelivery::from_data(data);
        let terminal = delivery.is_terminal();
        match self.registry.deliver(&request_id, delivery) {
            DeliveryOutcome::Delivered => trace!(request_id = %request_id, "Delivered peer data"),
            DeliveryOutcome::Discarded => {
                debug!(request_id = %request_id, "Discarded peer data during challenge recovery")
            }
            // A finish frame closes the slot before the peer's [DONE] arrives.
            DeliveryOutcome::Unknown if terminal => {
                debug!(request_id = %request_id, "Terminal frame for closed request")
            }
            DeliveryOutcome::Unknown => {
                warn!(request_id = %request_id, "Received data for unknown or closed request")
            }
        }
    }

    /// Push a command to the peer.
    pub fn send_command(&self, command: PeerCommand) -> Result<()> {
        self.hub.send(&OutboundMessage::command(command))
    }
}

fn random_index(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    rand::rng().random_range(0..n)
}

/// What a call yields to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// A decoded text fragment.
    Text(String),
    /// Challenge recovery resent the request; earlier partial text is void.
    Restarted { attempt: u32 },
    /// The response ended.
    Finished(Option<FinishReason>),
}

/// One in-flight request and its correlation slot.
pub struct RelayCall {
    state: Arc<RelayState>,
    model: String,
    envelope: ProviderEnvelope,
    slot: SlotReceiver,
    decoder: FrameDecoder,
    /// Last few raw bytes, so a signature split across chunks is still seen.
    tail: String,
    challenge: ChallengeState,
    pending: VecDeque<DecodedEvent>,
    finish_reason: Option<FinishReason>,
    finished: bool,
    settings: RelaySettings,
}

impl RelayCall {
    pub fn id(&self) -> &str {
        self.slot.id()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Next event; `Ok(None)` after the call finished.
    pub async fn next_event(&mut self) -> Result<Option<CallEvent>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            if let Some(event) = self.pending.pop_front() {
                match event {
                    DecodedEvent::TextToken(text) => return Ok(Some(CallEvent::Text(text))),
                    DecodedEvent::FinishSignal(reason) => {
                        self.finish_reason = Some(FinishReason::from(reason));
                        return Ok(Some(self.finish()));
                    }
                    DecodedEvent::DoneSignal => return Ok(Some(self.finish())),
                    DecodedEvent::ErrorSignal(message) => {
                        self.abort();
                        return Err(RelayError::Upstream(message));
                    }
                }
            }

            let timeout = self.settings.response_timeout;
            let delivery = match tokio::time::timeout(timeout, self.slot.recv()).await {
                Ok(delivery) => delivery,
                Err(_) => {
                    warn!(request_id = %self.id(), "No peer data within the response timeout");
                    self.abort();
                    return Err(RelayError::Timeout(timeout.as_secs()));
                }
            };

            match delivery {
                Some(PeerDelivery::Chunk(raw)) => {
                    trace!(request_id = %self.id(), bytes = raw.len(), "Peer chunk");
                    if let Some(signature) = self.settings.detector.scan(&mut self.tail, &raw) {
                        warn!(request_id = %self.id(), signature, "Security challenge detected");
                        let attempt = self.recover().await?;
                        return Ok(Some(CallEvent::Restarted { attempt }));
                    }
                    self.pending.extend(self.decoder.push(&raw));
                }
                Some(PeerDelivery::Done) => self.pending.extend(self.decoder.finish()),
                Some(PeerDelivery::Error(message)) => {
                    self.abort();
                    return Err(RelayError::Upstream(message));
                }
                None => {
                    self.abort();
                    return Err(RelayError::Upstream(PEER_DISCONNECTED.to_string()));
                }
            }
        }
    }

    /// Drain the call into one aggregated completion.
    ///
    /// Text that looks filtered is flagged and annotated for the client; see
    /// [`Completion::finalize`].
    pub async fn collect(self) -> Result<Completion> {
        let (content, reason) = self.drain().await?;
        Ok(Completion::finalize(content, reason))
    }

    /// Drain the call into the text exactly as the upstream produced it.
    pub async fn collect_text(self) -> Result<String> {
        Ok(self.drain().await?.0)
    }

    async fn drain(mut self) -> Result<(String, Option<FinishReason>)> {
        let mut content = String::new();
        while let Some(event) = self.next_event().await? {
            match event {
                CallEvent::Text(text) => content.push_str(&text),
                CallEvent::Restarted { .. } => content.clear(),
                CallEvent::Finished(reason) => return Ok((content, reason)),
            }
        }
        let reason = self.finish_reason.take();
        Ok((content, reason))
    }

    /// Refresh the peer and resend the request under the same id.
    async fn recover(&mut self) -> Result<u32> {
        let state = Arc::clone(&self.state);
        self.challenge
            .observe_epoch(state.hub.challenge_generation());
        let attempt = match self.challenge.register(self.settings.max_refresh_attempts) {
            ChallengeDecision::Refresh { attempt } => attempt,
            ChallengeDecision::Unresolved { attempts } => {
                self.abort();
                return Err(RelayError::ChallengeUnresolved { attempts });
            }
        };

        info!(
            request_id = %self.id(),
            attempt,
            backoff_ms = self.settings.challenge_backoff.as_millis() as u64,
            "Refreshing peer to clear security challenge"
        );
        state.registry.suspend(self.slot.id());
        if let Err(e) = state.send_command(PeerCommand::Refresh) {
            self.abort();
            return Err(e);
        }
        tokio::time::sleep(self.settings.challenge_backoff).await;

        let Some(epoch) = state.hub.epoch() else {
            self.abort();
            return Err(RelayError::PeerUnavailable);
        };
        state.registry.rearm(&mut self.slot, epoch);
        self.decoder.clear();
        self.tail.clear();
        self.pending.clear();
        self.finish_reason = None;

        if let Err(e) = state.hub.send(&OutboundMessage::Request {
            request_id: self.slot.id().to_string(),
            payload: self.envelope.clone(),
        }) {
            self.abort();
            return Err(e);
        }
        Ok(attempt)
    }

    fn finish(&mut self) -> CallEvent {
        self.finished = true;
        self.challenge.reset();
        self.state.registry.close(self.slot.id());
        CallEvent::Finished(self.finish_reason.clone())
    }

    fn abort(&mut self) {
        self.finished = true;
        self.challenge.reset();
        self.state.registry.close(self.slot.id());
    }
}

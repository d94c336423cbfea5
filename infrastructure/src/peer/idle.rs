//! Idle reconnect monitor.

use super::protocol::PeerCommand;
use super::relay::RelayState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often idleness is checked.
pub const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Ask the peer to reconnect if the gateway has been idle long enough.
///
/// Nothing happens while any request is open or when idle restart is off.
/// Returns whether a reconnect was sent.
pub fn check_idle(state: &RelayState) -> bool {
    let settings = state.settings();
    if !settings.enable_idle_restart || !state.registry().is_empty() || !state.hub().is_connected()
    {
        return false;
    }
    let idle = state.idle_for();
    if idle < settings.idle_restart_timeout {
        return false;
    }
    match state.send_command(PeerCommand::Reconnect) {
        Ok(()) => {
            info!(idle_secs = idle.as_secs(), "Idle timeout reached; asked peer to reconnect");
            state.touch();
            true
        }
        Err(e) => {
            warn!("Idle reconnect failed: {e}");
            false
        }
    }
}

/// Run [`check_idle`] every `interval` until `cancel` fires.
pub fn spawn_idle_monitor(
    state: Arc<RelayState>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    check_idle(&state);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use crate::peer::relay::RelaySettings;
    use relay_domain::{ChatCompletionRequest, ChatMessage};

    fn state(enable: bool, timeout: Duration) -> (tempfile::TempDir, Arc<RelayState>) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::load(dir.path().join("m.json"), dir.path().join("e.json"));
        let settings = RelaySettings {
            enable_idle_restart: enable,
            idle_restart_timeout: timeout,
            ..RelaySettings::default()
        };
        (dir, Arc::new(RelayState::new(settings, catalog)))
    }

    #[test]
    fn disabled_monitor_does_nothing() {
        let (_dir, state) = state(false, Duration::ZERO);
        let (_epoch, mut rx) = state.peer_connected();
        assert!(!check_idle(&state));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sends_reconnect_after_timeout() {
        let (_dir, state) = state(true, Duration::ZERO);
        let (_epoch, mut rx) = state.peer_connected();
        assert!(check_idle(&state));
        assert_eq!(rx.try_recv().unwrap(), r#"{"command":"reconnect"}"#);
    }

    #[test]
    fn open_requests_block_reconnect() {
        let (_dir, state) = state(true, Duration::ZERO);
        let (_epoch, _rx) = state.peer_connected();
        let request = ChatCompletionRequest::new("m", vec![ChatMessage::user("hi")])
            .with_bridge_ids(Some("s".into()), Some("m".into()));
        let call = state.open(&request).unwrap();
        assert!(!check_idle(&state));
        drop(call);
        assert!(check_idle(&state));
    }

    #[test]
    fn recent_activity_blocks_reconnect() {
        let (_dir, state) = state(true, Duration::from_secs(3600));
        let (_epoch, _rx) = state.peer_connected();
        assert!(!check_idle(&state));
    }
}

//! The single active automation peer connection.
//!
//! Requests never own the peer; they reach it through the hub, which holds
//! the outbound queue of whichever socket connected last. Each connection
//! gets a new epoch so a stale socket's disconnect cannot tear down its
//! replacement.

use super::error::{RelayError, Result};
use super::protocol::OutboundMessage;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

struct ActivePeer {
    epoch: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub struct PeerHub {
    active: RwLock<Option<ActivePeer>>,
    last_epoch: AtomicU64,
    challenge_generation: AtomicU64,
}

impl PeerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt a new connection, replacing any previous one.
    ///
    /// Returns the connection epoch and the queue the socket writer drains.
    pub fn connect(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let epoch = self.last_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self
            .active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(ActivePeer { epoch, tx });
        match previous {
            Some(old) => info!(epoch, replaced = old.epoch, "Peer connected, replacing previous connection"),
            None => info!(epoch, "Peer connected"),
        }
        (epoch, rx)
    }

    /// Drop the connection if `epoch` is still the active one.
    pub fn disconnect(&self, epoch: u64) -> bool {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|peer| peer.epoch == epoch) {
            *active = None;
            info!(epoch, "Peer disconnected");
            true
        } else {
            debug!(epoch, "Ignoring disconnect of a replaced connection");
            false
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|peer| !peer.tx.is_closed())
    }

    /// Epoch of the active connection.
    pub fn epoch(&self) -> Option<u64> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|peer| peer.epoch)
    }

    /// Queue a message for the active connection.
    pub fn send(&self, message: &OutboundMessage) -> Result<()> {
        let text = message.to_json()?;
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        let peer = active.as_ref().ok_or(RelayError::PeerUnavailable)?;
        peer.tx.send(text).map_err(|_| RelayError::PeerUnavailable)
    }

    /// Counter that invalidates per-request challenge attempts.
    pub fn challenge_generation(&self) -> u64 {
        self.challenge_generation.load(Ordering::SeqCst)
    }

    /// The peer reported a refresh: forget all challenge attempts.
    pub fn reset_challenges(&self) -> u64 {
        self.challenge_generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::protocol::PeerCommand;

    #[test]
    fn send_without_peer_is_unavailable() {
        let hub = PeerHub::new();
        assert!(!hub.is_connected());
        assert_eq!(
            hub.send(&OutboundMessage::command(PeerCommand::Refresh)),
            Err(RelayError::PeerUnavailable)
        );
    }

    #[test]
    fn new_connection_replaces_old() {
        let hub = PeerHub::new();
        let (first, mut first_rx) = hub.connect();
        let (second, mut second_rx) = hub.connect();
        assert!(second > first);
        assert_eq!(hub.epoch(), Some(second));

        hub.send(&OutboundMessage::command(PeerCommand::Reconnect)).unwrap();
        assert_eq!(
            second_rx.try_recv().unwrap(),
            r#"{"command":"reconnect"}"#
        );
        assert!(first_rx.try_recv().is_err());

        // The stale socket closing must not drop the new one.
        assert!(!hub.disconnect(first));
        assert!(hub.is_connected());
        assert!(hub.disconnect(second));
        assert!(!hub.is_connected());
    }

    #[test]
    fn closed_writer_counts_as_disconnected() {
        let hub = PeerHub::new();
        let (_epoch, rx) = hub.connect();
        drop(rx);
        assert!(!hub.is_connected());
        assert_eq!(
            hub.send(&OutboundMessage::command(PeerCommand::Refresh)),
            Err(RelayError::PeerUnavailable)
        );
    }

    #[test]
    fn challenge_generation_advances() {
        let hub = PeerHub::new();
        assert_eq!(hub.challenge_generation(), 0);
        assert_eq!(hub.reset_challenges(), 1);
        assert_eq!(hub.challenge_generation(), 1);
    }
}

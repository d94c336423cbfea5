//! Correlation registry: one delivery queue per in-flight request.
//!
//! The socket reader routes every inbound `{request_id, data}` message to the
//! slot registered under that id. A slot is owned by the request that opened
//! it through a [`SlotReceiver`]; dropping the receiver deregisters the slot,
//! so a client that goes away mid-stream never leaves an orphan behind.
//!
//! Uses `std::sync::RwLock` (not `tokio::sync::RwLock`) so that
//! deregistration can run synchronously from [`SlotReceiver::drop`]. The lock
//! is only held for map inserts and removals.

use super::error::{RelayError, Result};
use super::protocol::PeerDelivery;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Queued on the slot.
    Delivered,
    /// The slot exists but is suspended for challenge recovery.
    Discarded,
    /// No slot with that id (finished, timed out or never opened).
    Unknown,
}

struct SlotEntry {
    tx: mpsc::UnboundedSender<PeerDelivery>,
    created_at: Instant,
    epoch: u64,
    suspended: bool,
}

/// Map of correlation id to delivery queue.
#[derive(Default)]
pub struct CorrelationRegistry {
    slots: RwLock<HashMap<String, SlotEntry>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `id`, tied to peer connection `epoch`.
    pub fn register(self: &Arc<Self>, id: &str, epoch: u64) -> Result<SlotReceiver> {
        self.insert(id, epoch, None)
    }

    /// Like [`register`](Self::register), but fail with `ServerBusy` when
    /// `max` slots are already open. The check and the insert happen under
    /// one write lock.
    pub fn register_bounded(
        self: &Arc<Self>,
        id: &str,
        epoch: u64,
        max: usize,
    ) -> Result<SlotReceiver> {
        self.insert(id, epoch, Some(max))
    }

    fn insert(self: &Arc<Self>, id: &str, epoch: u64, max: Option<usize>) -> Result<SlotReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
            if slots.contains_key(id) {
                return Err(RelayError::DuplicateCorrelation(id.to_string()));
            }
            if max.is_some_and(|max| slots.len() >= max) {
                return Err(RelayError::ServerBusy);
            }
            slots.insert(
                id.to_string(),
                SlotEntry {
                    tx,
                    created_at: Instant::now(),
                    epoch,
                    suspended: false,
                },
            );
        }
        debug!(request_id = id, epoch, "Registry: slot opened");
        Ok(SlotReceiver {
            id: id.to_string(),
            epoch,
            rx,
            registry: Arc::clone(self),
        })
    }

    /// Route one delivery to its slot.
    ///
    /// A terminal delivery removes the slot before it is queued, so every
    /// slot sees at most one terminal event.
    pub fn deliver(&self, id: &str, delivery: PeerDelivery) -> DeliveryOutcome {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = slots.get(id) else {
            return DeliveryOutcome::Unknown;
        };
        if entry.suspended {
            trace!(request_id = id, "Registry: discarded delivery for suspended slot");
            return DeliveryOutcome::Discarded;
        }
        let tx = if delivery.is_terminal() {
            match slots.remove(id) {
                Some(entry) => entry.tx,
                None => return DeliveryOutcome::Unknown,
            }
        } else {
            entry.tx.clone()
        };
        drop(slots);

        if tx.send(delivery).is_err() {
            // Receiver already gone; Drop will (or did) remove the entry.
            return DeliveryOutcome::Unknown;
        }
        DeliveryOutcome::Delivered
    }

    /// Remove a slot. Returns whether it was still registered.
    pub fn close(&self, id: &str) -> bool {
        let removed = self
            .slots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(entry) = &removed {
            debug!(
                request_id = id,
                age_ms = entry.created_at.elapsed().as_millis() as u64,
                "Registry: slot closed"
            );
        }
        removed.is_some()
    }

    /// Fail every open slot with `reason`.
    ///
    /// Suspended slots are waiting for the peer to come back after a refresh
    /// and are left alone. Returns the number of slots failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        self.fail_where(reason, |_| true)
    }

    /// Fail open slots opened against a connection older than `epoch`.
    pub fn fail_before(&self, epoch: u64, reason: &str) -> usize {
        self.fail_where(reason, |entry| entry.epoch < epoch)
    }

    fn fail_where(&self, reason: &str, matches: impl Fn(&SlotEntry) -> bool) -> usize {
        let failed: Vec<SlotEntry> = {
            let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
            let ids: Vec<String> = slots
                .iter()
                .filter(|(_, entry)| !entry.suspended && matches(entry))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| slots.remove(id)).collect()
        };
        for entry in &failed {
            let _ = entry.tx.send(PeerDelivery::Error(reason.to_string()));
        }
        if !failed.is_empty() {
            debug!(count = failed.len(), reason, "Registry: failed open slots");
        }
        failed.len()
    }

    /// Start discarding deliveries for `id`.
    pub fn suspend(&self, id: &str) -> bool {
        self.set_suspended(id, true)
    }

    /// Accept deliveries for `id` again.
    pub fn resume(&self, id: &str) -> bool {
        self.set_suspended(id, false)
    }

    fn set_suspended(&self, id: &str, suspended: bool) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        match slots.get_mut(id) {
            Some(entry) => {
                entry.suspended = suspended;
                true
            }
            None => false,
        }
    }

    /// Give `slot` a fresh, resumed queue on connection `epoch`.
    ///
    /// Anything still queued from before (stale challenge output, a late
    /// terminal event) is dropped with the old queue. The slot is
    /// re-registered even if a terminal delivery already removed it.
    pub fn rearm(&self, slot: &mut SlotReceiver, epoch: u64) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let created_at = slots
            .get(&slot.id)
            .map(|entry| entry.created_at)
            .unwrap_or_else(Instant::now);
        slots.insert(
            slot.id.clone(),
            SlotEntry {
                tx,
                created_at,
                epoch,
                suspended: false,
            },
        );
        drop(slots);
        slot.rx = rx;
        slot.epoch = epoch;
        debug!(request_id = %slot.id, epoch, "Registry: slot rearmed");
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }
}

/// Receiving end of one correlation slot.
pub struct SlotReceiver {
    id: String,
    epoch: u64,
    rx: mpsc::UnboundedReceiver<PeerDelivery>,
    registry: Arc<CorrelationRegistry>,
}

impl SlotReceiver {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Next delivery; `None` once the slot was removed without a terminal event.
    pub async fn recv(&mut self) -> Option<PeerDelivery> {
        self.rx.recv().await
    }
}

impl Drop for SlotReceiver {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<CorrelationRegistry> {
        Arc::new(CorrelationRegistry::new())
    }

    #[tokio::test]
    async fn deliveries_arrive_in_order() {
        let registry = registry();
        let mut slot = registry.register("r1", 1).unwrap();
        assert_eq!(
            registry.deliver("r1", PeerDelivery::Chunk("a".into())),
            DeliveryOutcome::Delivered
        );
        registry.deliver("r1", PeerDelivery::Chunk("b".into()));
        assert_eq!(slot.recv().await, Some(PeerDelivery::Chunk("a".into())));
        assert_eq!(slot.recv().await, Some(PeerDelivery::Chunk("b".into())));
    }

    #[tokio::test]
    async fn terminal_delivery_removes_slot_first() {
        let registry = registry();
        let mut slot = registry.register("r1", 1).unwrap();
        assert_eq!(
            registry.deliver("r1", PeerDelivery::Done),
            DeliveryOutcome::Delivered
        );
        assert!(!registry.contains("r1"));
        assert_eq!(
            registry.deliver("r1", PeerDelivery::Error("late".into())),
            DeliveryOutcome::Unknown
        );
        assert_eq!(slot.recv().await, Some(PeerDelivery::Done));
        assert_eq!(slot.recv().await, None);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let registry = registry();
        let _slot = registry.register("r1", 1).unwrap();
        assert!(matches!(
            registry.register("r1", 1),
            Err(RelayError::DuplicateCorrelation(_))
        ));
    }

    #[test]
    fn bounded_registration_never_exceeds_the_cap() {
        let registry = registry();
        let admitted: Vec<SlotReceiver> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let registry = Arc::clone(&registry);
                    scope.spawn(move || registry.register_bounded(&format!("r{i}"), 1, 4))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|h| h.join().unwrap().ok())
                .collect()
        });
        assert_eq!(admitted.len(), 4);
        assert_eq!(registry.len(), 4);
        assert!(matches!(
            registry.register_bounded("late", 1, 4),
            Err(RelayError::ServerBusy)
        ));

        drop(admitted);
        assert!(registry.register_bounded("late", 1, 4).is_ok());
    }

    #[test]
    fn dropping_receiver_deregisters() {
        let registry = registry();
        let slot = registry.register("r1", 1).unwrap();
        assert_eq!(registry.len(), 1);
        drop(slot);
        assert!(registry.is_empty());
        assert!(!registry.close("r1"));
    }

    #[tokio::test]
    async fn fail_all_sends_exactly_one_error_per_slot() {
        let registry = registry();
        let mut a = registry.register("a", 1).unwrap();
        let mut b = registry.register("b", 1).unwrap();
        assert_eq!(registry.fail_all("Browser disconnected."), 2);
        assert!(registry.is_empty());

        for slot in [&mut a, &mut b] {
            assert_eq!(
                slot.recv().await,
                Some(PeerDelivery::Error("Browser disconnected.".into()))
            );
            assert_eq!(slot.recv().await, None);
        }
        assert_eq!(registry.fail_all("again"), 0);
    }

    #[tokio::test]
    async fn fail_before_spares_current_epoch() {
        let registry = registry();
        let mut old = registry.register("old", 1).unwrap();
        let _new = registry.register("new", 2).unwrap();
        assert_eq!(registry.fail_before(2, "replaced"), 1);
        assert!(registry.contains("new"));
        assert_eq!(old.recv().await, Some(PeerDelivery::Error("replaced".into())));
    }

    #[tokio::test]
    async fn suspended_slot_discards_and_survives_fail_all() {
        let registry = registry();
        let mut slot = registry.register("r1", 1).unwrap();
        registry.deliver("r1", PeerDelivery::Chunk("stale".into()));
        assert!(registry.suspend("r1"));
        assert_eq!(
            registry.deliver("r1", PeerDelivery::Done),
            DeliveryOutcome::Discarded
        );
        assert_eq!(registry.fail_all("Browser disconnected."), 0);

        registry.rearm(&mut slot, 2);
        assert_eq!(slot.epoch(), 2);
        registry.deliver("r1", PeerDelivery::Chunk("fresh".into()));
        assert_eq!(slot.recv().await, Some(PeerDelivery::Chunk("fresh".into())));
    }

    #[tokio::test]
    async fn resume_accepts_deliveries_again() {
        let registry = registry();
        let mut slot = registry.register("r1", 1).unwrap();
        registry.suspend("r1");
        registry.deliver("r1", PeerDelivery::Chunk("dropped".into()));
        assert!(registry.resume("r1"));
        registry.deliver("r1", PeerDelivery::Chunk("kept".into()));
        assert_eq!(slot.recv().await, Some(PeerDelivery::Chunk("kept".into())));
        assert!(!registry.resume("missing"));
    }

    #[tokio::test]
    async fn rearm_restores_a_removed_slot() {
        let registry = registry();
        let mut slot = registry.register("r1", 1).unwrap();
        registry.deliver("r1", PeerDelivery::Done);
        assert!(!registry.contains("r1"));
        registry.rearm(&mut slot, 1);
        assert!(registry.contains("r1"));
        registry.deliver("r1", PeerDelivery::Chunk("x".into()));
        assert_eq!(slot.recv().await, Some(PeerDelivery::Chunk("x".into())));
    }
}

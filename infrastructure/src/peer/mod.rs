//! Automation peer relay
//!
//! One browser-side peer serves every client request. The [`PeerHub`] holds
//! its socket, the [`CorrelationRegistry`] demultiplexes its replies by
//! request id, and [`RelayState`] ties both to admission control and the
//! model catalog.

pub mod backend;
pub mod error;
pub mod hub;
pub mod idle;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod relay;

pub use backend::RelayChatBackend;
pub use error::RelayError;
pub use hub::PeerHub;
pub use idle::{IDLE_CHECK_INTERVAL, check_idle, spawn_idle_monitor};
pub use protocol::{InboundMessage, OutboundMessage, PeerCommand, PeerDelivery};
pub use rate_limit::RateLimiter;
pub use registry::{CorrelationRegistry, DeliveryOutcome, SlotReceiver};
pub use relay::{CallEvent, PEER_DISCONNECTED, RelayCall, RelaySettings, RelayState};

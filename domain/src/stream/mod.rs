//! Peer stream handling: frame decoding and challenge detection.

pub mod challenge;
pub mod decoder;

pub use challenge::{
    ChallengeDecision, ChallengeDetector, ChallengeState, DEFAULT_CHALLENGE_SIGNATURES,
};
pub use decoder::{DONE_SENTINEL, DecodedEvent, FrameDecoder, decode};

//! Peer connection engine
//!
//! The signaling session talks to peer connections only through the
//! [`PeerEngine`] capability set. [`RtcPeerEngine`] is the production engine.

mod connection;
pub mod engine;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{RtcEngineFactory, RtcPeerEngine};
pub use engine::{
    EngineEvent, EngineEventReceiver, EngineEventSender, IceConnectionState, PeerEngine,
    PeerEngineFactory,
};

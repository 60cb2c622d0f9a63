//! WebRTC signaling relay
//!
//! Accepts WebSocket signaling connections and terminates each one in a
//! server-side WebRTC peer connection: offers are answered, ICE candidates
//! are relayed in both directions, and the peer connection and the WebSocket
//! are torn down together when either side goes away.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Browser / native client                                 │
//! │  ↓ (JSON over WebSocket: offer, answer, candidate)       │
//! │  WebSocketSignalingServer                                │
//! │  └─ SessionRegistry (active sessions, lifecycle events)  │
//! │     └─ SignalingSession (one per connection)             │
//! │        ├─ SignalingTransport (WsTransport)               │
//! │        └─ PeerEngine (RtcPeerEngine / webrtc crate)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use webrtc_relay::{IceServerConfig, SignalingConfig};
//!
//! let config = SignalingConfig::default()
//!     .with_ice_servers(vec![IceServerConfig::stun("stun:stun.example.com:3478")])
//!     .with_negotiation_timeout_secs(30);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.resolved_ice_servers().len(), 1);
//! ```
//!
//! ## Running a server
//!
//! ```no_run
//! use std::sync::Arc;
//! use webrtc_relay::{RelayConfig, RtcEngineFactory, WebSocketSignalingServer};
//!
//! # async fn example() -> webrtc_relay::Result<()> {
//! let factory = Arc::new(RtcEngineFactory::new()?);
//! let server = WebSocketSignalingServer::from_config(RelayConfig::default(), factory);
//! let handle = server.start().await?;
//!
//! println!("listening on {}", handle.local_addr());
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{IceServerConfig, RelayConfig, ServerConfig, SignalingConfig, DEFAULT_STUN_SERVER};
pub use error::{Error, Result};
pub use peer::{
    EngineEvent, IceConnectionState, PeerEngine, PeerEngineFactory, RtcEngineFactory,
    RtcPeerEngine,
};
pub use session::{SessionEvent, SessionId, SessionRegistry, SessionState, SignalingSession};
pub use signaling::{
    IceCandidate, SdpType, SessionDescription, SignalingMessage, SignalingTransport,
    TransportEvent, WebSocketServerHandle, WebSocketSignalingServer,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}

//! Peer connection engine abstraction
//!
//! The signaling session drives an engine through this capability set and
//! never touches ICE, DTLS or SDP internals itself. [`super::RtcPeerEngine`]
//! implements it on top of the `webrtc` crate.

use crate::config::IceServerConfig;
use crate::signaling::protocol::{IceCandidate, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// ICE connection state reported by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Events an engine emits on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A local ICE candidate was gathered. `None` marks the end of gathering.
    LocalCandidate(Option<IceCandidate>),
    /// A remote media track arrived
    Track { kind: String, track_id: String },
    /// The ICE connection state changed
    IceConnectionStateChange(IceConnectionState),
}

/// Sender half handed to an engine at creation
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Receiver half consumed by the owning session
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// One peer connection
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Apply the remote peer's description
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Generate an answer to the current remote offer
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a local description
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// Current local description, if one has been applied
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Add a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Release the connection. No further events are emitted afterwards.
    async fn close(&self) -> Result<()>;
}

/// Creates engines for new sessions
#[async_trait]
pub trait PeerEngineFactory: Send + Sync {
    /// Create an engine configured with `ice_servers` that reports its
    /// events on `events`
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: EngineEventSender,
    ) -> Result<Arc<dyn PeerEngine>>;
}

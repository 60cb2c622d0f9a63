//! Signaling protocol and transports
//!
//! - [`protocol`]: JSON wire messages (offer / answer / candidate)
//! - [`transport`]: the connection abstraction a session is bound to
//! - [`websocket`]: WebSocket server and transport

pub mod protocol;
pub mod transport;
pub mod websocket;

pub use protocol::{IceCandidate, SdpType, SessionDescription, SignalingMessage};
pub use transport::{SignalingTransport, TransportEvent};
pub use websocket::{WebSocketServerHandle, WebSocketSignalingServer, WsTransport};

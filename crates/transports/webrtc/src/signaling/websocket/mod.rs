//! WebSocket signaling server
//!
//! One WebSocket connection carries the signaling traffic of exactly one
//! session. Text frames (and binary frames holding UTF-8) are signaling
//! messages; tokio-tungstenite answers Ping frames with Pong.

mod handler;
mod server;
mod transport;

pub use server::{WebSocketServerHandle, WebSocketSignalingServer};
pub use transport::WsTransport;

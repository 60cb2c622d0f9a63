//! Transport abstraction between a signaling session and its connection
//!
//! A session owns one [`SignalingTransport`] for sending and consumes one
//! stream of [`TransportEvent`]s for everything arriving on the connection.

use crate::Result;
use async_trait::async_trait;

/// Outbound half of a framed, ordered, reliable text connection
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Send one text frame
    async fn send(&self, text: String) -> Result<()>;

    /// Close the connection. Called once by the owning session.
    async fn close(&self) -> Result<()>;
}

/// Inbound events from a transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame
    Message(String),
    /// The remote side closed the connection
    Closed,
    /// The connection failed
    Error(String),
}

//! WebSocket implementation of [`SignalingTransport`]
//!
//! Frames are queued on a channel and written by a single forward task that
//! owns the WebSocket sink, so frames written by the session and the close
//! issued on teardown never interleave.

use crate::signaling::transport::SignalingTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error};

pub(crate) type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Frames queued for the forward task
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Close,
}

/// Outbound half of one WebSocket connection
pub struct WsTransport {
    tx: mpsc::Sender<Outbound>,
    closed: AtomicBool,
}

impl WsTransport {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn send(&self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::WebSocketError("connection closed".to_string()));
        }
        self.tx
            .send(Outbound::Text(text))
            .await
            .map_err(|_| Error::WebSocketError("connection closed".to_string()))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // The forward task may already be gone if the socket failed
        let _ = self.tx.send(Outbound::Close).await;
        Ok(())
    }
}

/// Write queued frames to the socket until `Close` or a write failure
pub(crate) async fn forward(mut sink: WsSink, mut outbound: mpsc::Receiver<Outbound>, addr: SocketAddr) {
    while let Some(frame) = outbound.recv().await {
        let result = match frame {
            Outbound::Text(text) => sink.send(Message::Text(text)).await,
            Outbound::Close => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                debug!("Closed WebSocket to {}", addr);
                break;
            }
        };

        if let Err(e) = result {
            error!("Failed to send WebSocket message to {}: {}", addr, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_queues_text_frames() {
        let (tx, mut rx) = mpsc::channel(4);
        let transport = WsTransport::new(tx);

        transport.send("hello".to_string()).await.unwrap();

        assert!(matches!(rx.recv().await, Some(Outbound::Text(text)) if text == "hello"));
    }

    #[tokio::test]
    async fn test_close_is_queued_once_and_blocks_sends() {
        let (tx, mut rx) = mpsc::channel(4);
        let transport = WsTransport::new(tx);

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.send("late".to_string()).await.is_err());
        drop(transport);

        assert!(matches!(rx.recv().await, Some(Outbound::Close)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_fails_when_socket_is_gone() {
        let (tx, rx) = mpsc::channel(4);
        let transport = WsTransport::new(tx);
        drop(rx);

        let err = transport.send("x".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::WebSocketError(_)));
        assert!(transport.close().await.is_ok());
    }
}

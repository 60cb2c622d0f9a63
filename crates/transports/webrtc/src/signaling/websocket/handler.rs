//! Per-connection WebSocket handler
//!
//! Upgrades the TCP stream, binds a new session to it through the registry
//! and pumps frames into the session until either side goes away.

use super::transport::{forward, Outbound, WsTransport};
use crate::session::SessionRegistry;
use crate::signaling::transport::TransportEvent;
use crate::{Error, Result};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Outbound frame queue depth per connection
const OUTBOUND_CAPACITY: usize = 128;

/// Inbound event queue depth per connection
const INCOMING_CAPACITY: usize = 128;

/// How long the close frame may take to flush after the session ends
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle a single WebSocket connection
pub(crate) async fn handle_connection(stream: TcpStream, registry: SessionRegistry) -> Result<()> {
    let addr = stream.peer_addr()?;
    debug!("New WebSocket connection from: {}", addr);

    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| Error::WebSocketError(format!("Handshake with {} failed: {}", addr, e)))?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let (out_tx, out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);
    let mut forward_task = tokio::spawn(forward(ws_tx, out_rx, addr));

    // The forward task ends once the transport closes or is dropped
    let transport = Arc::new(WsTransport::new(out_tx));
    let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CAPACITY);

    let session = match registry.accept(transport, incoming_rx).await {
        Ok(session) => session,
        Err(e) => {
            let _ = forward_task.await;
            return Err(e);
        }
    };
    info!(session_id = %session.id(), "WebSocket client {} bound to session", addr);

    loop {
        let frame = tokio::select! {
            _ = session.closed() => break,
            frame = ws_rx.next() => match frame {
                Some(frame) => frame,
                None => {
                    let _ = incoming_tx.send(TransportEvent::Closed).await;
                    break;
                }
            },
        };

        let event = match frame {
            Ok(Message::Text(text)) => TransportEvent::Message(text),
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => TransportEvent::Message(text),
                Err(_) => {
                    debug!(session_id = %session.id(), "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            // tungstenite queues the Pong reply itself
            Ok(Message::Ping(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(session_id = %session.id(), "WebSocket connection closed by client: {}", addr);
                let _ = incoming_tx.send(TransportEvent::Closed).await;
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                error!(session_id = %session.id(), "WebSocket error from {}: {}", addr, e);
                let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                break;
            }
        };

        // The session stops reading once it is closed
        if incoming_tx.send(event).await.is_err() {
            break;
        }
    }

    session.close().await;

    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut forward_task)
        .await
        .is_err()
    {
        warn!("Close frame to {} not flushed in time", addr);
        forward_task.abort();
    }

    debug!(session_id = %session.id(), "Connection handler for {} exited", addr);
    Ok(())
}

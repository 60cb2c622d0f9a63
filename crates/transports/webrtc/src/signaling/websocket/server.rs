//! WebSocket signaling server
//!
//! Accepts connections on a TCP listener and hands each one to its own
//! signaling session. Runs on the caller's Tokio runtime.

use super::handler::handle_connection;
use crate::config::{RelayConfig, ServerConfig, SignalingConfig};
use crate::peer::PeerEngineFactory;
use crate::session::SessionRegistry;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// WebSocket signaling server
pub struct WebSocketSignalingServer {
    server: ServerConfig,
    signaling: Arc<SignalingConfig>,
    factory: Arc<dyn PeerEngineFactory>,
}

impl WebSocketSignalingServer {
    pub fn new(
        server: ServerConfig,
        signaling: SignalingConfig,
        factory: Arc<dyn PeerEngineFactory>,
    ) -> Self {
        Self {
            server,
            signaling: Arc::new(signaling),
            factory,
        }
    }

    /// Create a server from a full relay configuration
    pub fn from_config(config: RelayConfig, factory: Arc<dyn PeerEngineFactory>) -> Self {
        Self::new(config.server, config.signaling, factory)
    }

    /// Bind the listener and start accepting connections
    ///
    /// Returns once the listener is bound. The returned handle stops the
    /// server and closes every live session.
    pub async fn start(self) -> Result<WebSocketServerHandle> {
        let bind_address = self.server.bind_address();
        let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
            error!("Failed to bind WebSocket server to {}: {}", bind_address, e);
            e
        })?;
        let local_addr = listener.local_addr()?;

        let registry = SessionRegistry::new(
            self.signaling,
            self.factory,
            self.server.max_sessions,
        );

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        info!(
            max_sessions = self.server.max_sessions,
            "WebSocket signaling server listening on ws://{}",
            local_addr
        );

        let accept_registry = registry.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                debug!("Accepted TCP connection from {}", peer_addr);
                                let registry = accept_registry.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, registry).await {
                                        warn!("WebSocket connection from {} ended: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept WebSocket connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("WebSocket signaling server received shutdown signal");
                        break;
                    }
                }
            }

            info!("WebSocket signaling server accept loop exited");
        });

        Ok(WebSocketServerHandle {
            local_addr,
            registry,
            shutdown_tx,
            accept_task,
        })
    }
}

/// Handle for controlling a running [`WebSocketSignalingServer`]
pub struct WebSocketServerHandle {
    local_addr: SocketAddr,
    registry: SessionRegistry,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: JoinHandle<()>,
}

impl WebSocketServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Live sessions
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Stop accepting connections and close every live session
    pub async fn shutdown(self) {
        info!("Sending shutdown signal to WebSocket server");
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.accept_task.await {
            error!("WebSocket accept loop panicked: {}", e);
        }

        self.registry.close_all().await;
        info!("WebSocket signaling server stopped");
    }
}

//! Active-session table
//!
//! The registry creates a [`SignalingSession`] for every accepted connection
//! and forgets it once the session reports [`SessionEvent::Closed`]. One
//! observer task drains the lifecycle events of all sessions.

use super::id::SessionId;
use super::session::{SessionEvent, SignalingSession};
use crate::config::SignalingConfig;
use crate::peer::PeerEngineFactory;
use crate::signaling::transport::{SignalingTransport, TransportEvent};
use crate::{Error, Result};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle event channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 256;

type SessionTable = Arc<RwLock<HashMap<SessionId, SignalingSession>>>;

/// Registry of live signaling sessions
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: SessionTable,
    config: Arc<SignalingConfig>,
    factory: Arc<dyn PeerEngineFactory>,
    /// 0 = unlimited
    max_sessions: usize,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl SessionRegistry {
    /// Create a registry and spawn its lifecycle observer
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: Arc<SignalingConfig>,
        factory: Arc<dyn PeerEngineFactory>,
        max_sessions: usize,
    ) -> Self {
        let sessions: SessionTable = Arc::new(RwLock::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(observe(Arc::clone(&sessions), event_rx));

        Self {
            sessions,
            config,
            factory,
            max_sessions,
            event_tx,
        }
    }

    /// Create and register a session for a newly accepted connection
    ///
    /// On error the transport has already been closed.
    pub async fn accept(
        &self,
        transport: Arc<dyn SignalingTransport>,
        incoming: mpsc::Receiver<TransportEvent>,
    ) -> Result<SignalingSession> {
        if self.at_capacity().await {
            return Err(self.reject(transport).await);
        }

        let session = SignalingSession::start(
            Arc::clone(&self.config),
            Arc::clone(&transport),
            incoming,
            self.factory.as_ref(),
            Some(self.event_tx.clone()),
        )
        .await?;

        {
            let mut sessions = self.sessions.write().await;
            if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
                drop(sessions);
                session.close().await;
                return Err(Error::CapacityExceeded(format!(
                    "{} active sessions",
                    self.max_sessions
                )));
            }
            sessions.insert(session.id().clone(), session.clone());
        }

        // The session may have closed before it was recorded; its Closed
        // event then found nothing to remove.
        if session.is_closed() {
            self.sessions.write().await.remove(session.id());
        }

        let active_sessions = self.session_count().await;
        info!(
            session_id = %session.id(),
            active_sessions,
            "Session registered"
        );
        Ok(session)
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Identifiers of live sessions
    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, id: &SessionId) -> Option<SignalingSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Close every live session and wait until each has released its
    /// resources
    pub async fn close_all(&self) {
        let sessions: Vec<SignalingSession> =
            self.sessions.write().await.drain().map(|(_, s)| s).collect();

        if sessions.is_empty() {
            return;
        }

        info!("Closing {} sessions", sessions.len());
        join_all(sessions.iter().map(|session| session.close())).await;
    }

    async fn at_capacity(&self) -> bool {
        self.max_sessions > 0 && self.session_count().await >= self.max_sessions
    }

    async fn reject(&self, transport: Arc<dyn SignalingTransport>) -> Error {
        warn!(
            max_sessions = self.max_sessions,
            "Session limit reached, rejecting connection"
        );
        if let Err(e) = transport.close().await {
            warn!("Failed to close rejected transport: {}", e);
        }
        Error::CapacityExceeded(format!("{} active sessions", self.max_sessions))
    }
}

async fn observe(sessions: SessionTable, mut events: mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        debug!(session_id = %event.session_id(), "Session event: {}", event.name());

        match event {
            SessionEvent::Disconnected { session_id } => {
                info!(session_id = %session_id, "Session peer disconnected");
            }
            SessionEvent::Closed { session_id } => {
                let mut sessions = sessions.write().await;
                if sessions.remove(&session_id).is_some() {
                    info!(
                        session_id = %session_id,
                        active_sessions = sessions.len(),
                        "Session removed"
                    );
                }
            }
        }
    }
    debug!("Session observer exited");
}

//! Signaling session: one client connection, one peer connection engine
//!
//! A session translates transport messages into engine calls and engine
//! events into transport messages, and keeps the two lifecycles in lockstep:
//! the engine and the transport are released together, exactly once, by
//! [`SignalingSession::close`].
//!
//! ```text
//! Negotiating ──ICE connected──▶ Connected
//!      │                            │
//!      └──ICE disconnected──▶ Disconnected ──▶ Closed
//!
//! any state ──close / transport closed / transport error──▶ Closed
//! ```
//!
//! Each session runs three tasks: a transport reader, a negotiation worker
//! that handles queued messages in arrival order, and an engine event pump.
//! The reader closes the session as soon as the transport goes away, even if
//! a negotiation step is still suspended on the engine. Every step re-checks
//! the session before touching the engine or transport, so late completions
//! are dropped.

use super::id::SessionId;
use crate::config::SignalingConfig;
use crate::peer::{
    EngineEvent, EngineEventReceiver, IceConnectionState, PeerEngine, PeerEngineFactory,
};
use crate::signaling::protocol::{IceCandidate, SessionDescription, SignalingMessage};
use crate::signaling::transport::{SignalingTransport, TransportEvent};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

/// Messages waiting for the negotiation worker
const NEGOTIATION_QUEUE_CAPACITY: usize = 32;

/// Session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Offer/answer and ICE exchange in progress
    Negotiating,
    /// The engine reported ICE connected
    Connected,
    /// The engine reported ICE disconnected; close follows immediately
    Disconnected,
    /// Terminal
    Closed,
}

/// Lifecycle events observed by the owning registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The remote peer's ICE connection dropped
    Disconnected { session_id: SessionId },
    /// The session released its engine and transport
    Closed { session_id: SessionId },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Disconnected { session_id } | Self::Closed { session_id } => session_id,
        }
    }

    /// Get the event name for logging/debugging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected { .. } => "disconnected",
            Self::Closed { .. } => "closed",
        }
    }
}

/// Signaling state machine for one client
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SignalingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    config: Arc<SignalingConfig>,
    state_tx: watch::Sender<SessionState>,
    /// Emptied by close
    engine: Mutex<Option<Arc<dyn PeerEngine>>>,
    /// Emptied by close
    transport: Mutex<Option<Arc<dyn SignalingTransport>>>,
    event_tx: Option<mpsc::Sender<SessionEvent>>,
}

impl SignalingSession {
    /// Create a session for an accepted connection and start processing its
    /// events
    ///
    /// The engine is created with the configured ICE servers (or the default
    /// STUN server). Engine and transport listeners are running before this
    /// returns. If the engine cannot be created the transport is closed and
    /// the error returned.
    pub async fn start(
        config: Arc<SignalingConfig>,
        transport: Arc<dyn SignalingTransport>,
        incoming: mpsc::Receiver<TransportEvent>,
        factory: &dyn PeerEngineFactory,
        event_tx: Option<mpsc::Sender<SessionEvent>>,
    ) -> Result<Self> {
        let id = SessionId::generate();
        let ice_servers = config.resolved_ice_servers();
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();

        let engine = match factory.create(&ice_servers, engine_tx).await {
            Ok(engine) => engine,
            Err(e) => {
                error!(session_id = %id, "Failed to create peer connection: {}", e);
                if let Err(close_err) = transport.close().await {
                    warn!(session_id = %id, "Failed to close transport: {}", close_err);
                }
                return Err(e);
            }
        };

        info!(
            session_id = %id,
            ice_servers = ice_servers.len(),
            "Signaling session created"
        );

        let (state_tx, _) = watch::channel(SessionState::Negotiating);
        let session = Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                state_tx,
                engine: Mutex::new(Some(engine)),
                transport: Mutex::new(Some(transport)),
                event_tx,
            }),
        };

        session.spawn_engine_pump(engine_rx);
        session.spawn_transport_reader(incoming);
        if let Some(secs) = session.inner.config.negotiation_timeout_secs {
            session.spawn_negotiation_deadline(Duration::from_secs(secs));
        }

        Ok(session)
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        let mut state_rx = self.inner.state_tx.subscribe();
        let _ = state_rx
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }

    /// Dispatch one text frame from the transport
    ///
    /// Unknown message types and malformed payloads are ignored. Engine
    /// failures are logged; the session stays open so the peer can retry.
    pub async fn handle_message(&self, text: &str) {
        let message = match SignalingMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(session_id = %self.id(), "Ignoring signaling message: {}", e);
                return;
            }
        };

        let kind = message.kind();
        let result = match message {
            SignalingMessage::Offer { offer } => self.handle_offer(offer).await,
            SignalingMessage::Answer { answer } => self.handle_answer(answer).await,
            SignalingMessage::Candidate { candidate } => self.handle_candidate(candidate).await,
        };

        match result {
            Ok(()) => {}
            Err(e) if e.is_session_closed() => {
                debug!(session_id = %self.id(), "Dropped {} result: {}", kind, e);
            }
            Err(e) => {
                error!(session_id = %self.id(), "{} handling failed: {}", kind, e);
            }
        }
    }

    /// Accept a remote offer and reply with an answer
    ///
    /// Runs set-remote, create-answer, set-local and send strictly in that
    /// order. Returns [`Error::SessionClosed`] if the session closes between
    /// steps; nothing is sent in that case.
    #[instrument(skip_all, fields(session_id = %self.id()))]
    pub async fn handle_offer(&self, offer: SessionDescription) -> Result<()> {
        debug!("Handling offer ({} bytes)", offer.sdp.len());

        self.engine()?.set_remote_description(offer).await?;
        let answer = self.engine()?.create_answer().await?;
        self.engine()?
            .set_local_description(answer.clone())
            .await?;
        let local = self.engine()?.local_description().await.unwrap_or(answer);

        self.send(&SignalingMessage::Answer { answer: local }).await?;
        info!("Sent answer");
        Ok(())
    }

    /// Apply a remote answer
    #[instrument(skip_all, fields(session_id = %self.id()))]
    pub async fn handle_answer(&self, answer: SessionDescription) -> Result<()> {
        debug!("Handling answer ({} bytes)", answer.sdp.len());
        self.engine()?.set_remote_description(answer).await
    }

    /// Add a remote ICE candidate
    #[instrument(skip_all, fields(session_id = %self.id()))]
    pub async fn handle_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.engine()?.add_ice_candidate(candidate).await
    }

    /// Release the engine and the transport and emit [`SessionEvent::Closed`]
    ///
    /// Idempotent: only the first call does anything.
    pub async fn close(&self) {
        if !self.transition(SessionState::Closed) {
            return;
        }

        let engine = self.inner.engine.lock().take();
        let transport = self.inner.transport.lock().take();

        if let Some(engine) = engine {
            if let Err(e) = engine.close().await {
                warn!(session_id = %self.id(), "Failed to close peer connection: {}", e);
            }
        }
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                warn!(session_id = %self.id(), "Failed to close transport: {}", e);
            }
        }

        self.emit(SessionEvent::Closed {
            session_id: self.id().clone(),
        })
        .await;

        info!(session_id = %self.id(), "Session closed");
    }

    async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::LocalCandidate(Some(candidate)) => {
                debug!(session_id = %self.id(), "Relaying local candidate: {}", candidate.candidate);
                if let Err(e) = self.send(&SignalingMessage::Candidate { candidate }).await {
                    if !e.is_session_closed() {
                        warn!(session_id = %self.id(), "Failed to send candidate: {}", e);
                    }
                }
            }
            EngineEvent::LocalCandidate(None) => {
                debug!(session_id = %self.id(), "ICE gathering complete");
            }
            EngineEvent::Track { kind, track_id } => {
                info!(session_id = %self.id(), kind = %kind, track_id = %track_id, "Track received");
            }
            EngineEvent::IceConnectionStateChange(state) => {
                self.handle_ice_state(state).await;
            }
        }
    }

    async fn handle_ice_state(&self, state: IceConnectionState) {
        debug!(session_id = %self.id(), "ICE connection state: {}", state);

        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                if self.transition(SessionState::Connected) {
                    info!(session_id = %self.id(), "Peer connected");
                }
            }
            IceConnectionState::Disconnected => {
                if self.transition(SessionState::Disconnected) {
                    info!(session_id = %self.id(), "Peer disconnected");
                    self.emit(SessionEvent::Disconnected {
                        session_id: self.id().clone(),
                    })
                    .await;
                    self.close().await;
                }
            }
            IceConnectionState::Failed => {
                warn!(session_id = %self.id(), "ICE connection failed");
            }
            _ => {}
        }
    }

    /// Move to `next` unless already there or closed. Returns whether the
    /// state changed.
    fn transition(&self, next: SessionState) -> bool {
        self.inner.state_tx.send_if_modified(|state| {
            if *state == SessionState::Closed || *state == next {
                return false;
            }
            debug!(session_id = %self.inner.id, "State transition: {:?} -> {:?}", state, next);
            *state = next;
            true
        })
    }

    fn engine(&self) -> Result<Arc<dyn PeerEngine>> {
        if self.is_closed() {
            return Err(Error::SessionClosed(self.id().to_string()));
        }
        self.inner
            .engine
            .lock()
            .clone()
            .ok_or_else(|| Error::SessionClosed(self.id().to_string()))
    }

    fn transport(&self) -> Result<Arc<dyn SignalingTransport>> {
        if self.is_closed() {
            return Err(Error::SessionClosed(self.id().to_string()));
        }
        self.inner
            .transport
            .lock()
            .clone()
            .ok_or_else(|| Error::SessionClosed(self.id().to_string()))
    }

    async fn send(&self, message: &SignalingMessage) -> Result<()> {
        let transport = self.transport()?;
        transport.send(message.to_json()?).await
    }

    async fn emit(&self, event: SessionEvent) {
        if let Some(ref tx) = self.inner.event_tx {
            if let Err(e) = tx.send(event).await {
                warn!(session_id = %self.id(), "Failed to emit session event: {}", e);
            }
        }
    }

    fn spawn_engine_pump(&self, mut events: EngineEventReceiver) {
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.closed() => break,
                    event = events.recv() => match event {
                        Some(event) => session.handle_engine_event(event).await,
                        None => break,
                    },
                }
            }
            debug!(session_id = %session.id(), "Engine event pump exited");
        });
    }

    fn spawn_transport_reader(&self, mut incoming: mpsc::Receiver<TransportEvent>) {
        let (queue_tx, mut queue_rx) = mpsc::channel::<String>(NEGOTIATION_QUEUE_CAPACITY);

        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.closed() => break,
                    event = incoming.recv() => match event {
                        Some(TransportEvent::Message(text)) => {
                            // Blocks while the worker is behind, which in turn
                            // stops the connection from reading the socket
                            tokio::select! {
                                _ = session.closed() => break,
                                sent = queue_tx.send(text) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Some(TransportEvent::Closed) | None => {
                            debug!(session_id = %session.id(), "Transport closed");
                            session.close().await;
                            break;
                        }
                        Some(TransportEvent::Error(reason)) => {
                            error!(session_id = %session.id(), "Transport error: {}", reason);
                            session.close().await;
                            break;
                        }
                    },
                }
            }
        });

        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = session.closed() => break,
                    text = queue_rx.recv() => match text {
                        Some(text) => session.handle_message(&text).await,
                        None => break,
                    },
                }
            }
        });
    }

    fn spawn_negotiation_deadline(&self, deadline: Duration) {
        let session = self.clone();
        tokio::spawn(async move {
            let mut state_rx = session.subscribe_state();
            let settled = tokio::time::timeout(
                deadline,
                state_rx.wait_for(|state| *state != SessionState::Negotiating),
            )
            .await
            .is_ok();

            if !settled {
                warn!(
                    session_id = %session.id(),
                    timeout_secs = deadline.as_secs(),
                    "Negotiation timed out"
                );
                session.close().await;
            }
        });
    }
}

impl std::fmt::Debug for SignalingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingSession")
            .field("id", self.id())
            .field("state", &self.state())
            .finish()
    }
}

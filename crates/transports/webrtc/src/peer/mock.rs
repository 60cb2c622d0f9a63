//! Scripted engine and transport doubles for session tests

use super::engine::{EngineEvent, EngineEventSender, PeerEngine, PeerEngineFactory};
use crate::config::IceServerConfig;
use crate::signaling::protocol::{IceCandidate, SdpType, SessionDescription, SignalingMessage};
use crate::signaling::transport::SignalingTransport;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const MOCK_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-answer\r\n";

/// Engine operations as recorded by [`MockEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    SetRemote(SdpType),
    CreateAnswer,
    SetLocal(SdpType),
    AddCandidate(String),
    Close,
}

#[derive(Default)]
pub struct MockEngine {
    pub calls: Mutex<Vec<EngineCall>>,
    pub fail_set_remote: AtomicBool,
    pub fail_create_answer: AtomicBool,
    pub fail_add_candidate: AtomicBool,
    pub close_count: AtomicUsize,
    local: Mutex<Option<SessionDescription>>,
    events: Mutex<Option<EngineEventSender>>,
    /// When set, `set_remote_description` waits for a permit
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Emit an engine event as the real engine would from a callback
    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Make `set_remote_description` block until the returned semaphore
    /// receives a permit
    pub fn hold_set_remote(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PeerEngine for MockEngine {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.record(EngineCall::SetRemote(description.sdp_type));
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::PeerConnectionError(e.to_string()))?;
        }
        if self.fail_set_remote.load(Ordering::SeqCst) {
            return Err(Error::SdpError("remote description rejected".to_string()));
        }
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateAnswer);
        if self.fail_create_answer.load(Ordering::SeqCst) {
            return Err(Error::SdpError("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer(MOCK_ANSWER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.record(EngineCall::SetLocal(description.sdp_type));
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(EngineCall::AddCandidate(candidate.candidate));
        if self.fail_add_candidate.load(Ordering::SeqCst) {
            return Err(Error::IceCandidateError("no remote description".to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(EngineCall::Close);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.events.lock().take();
        Ok(())
    }
}

/// Factory handing out one shared [`MockEngine`]
#[derive(Default)]
pub struct MockEngineFactory {
    pub engine: Arc<MockEngine>,
    pub fail_create: AtomicBool,
    pub ice_servers: Mutex<Vec<IceServerConfig>>,
}

#[async_trait]
impl PeerEngineFactory for MockEngineFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: EngineEventSender,
    ) -> Result<Arc<dyn PeerEngine>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::WebRtcError("engine unavailable".to_string()));
        }
        *self.ice_servers.lock() = ice_servers.to_vec();
        *self.engine.events.lock() = Some(events);
        Ok(Arc::clone(&self.engine) as Arc<dyn PeerEngine>)
    }
}

/// Transport recording every frame it is asked to send
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<String>>,
    pub close_count: AtomicUsize,
}

impl MockTransport {
    pub fn sent(&self) -> Vec<SignalingMessage> {
        self.sent
            .lock()
            .iter()
            .map(|text| SignalingMessage::parse(text).expect("session sent invalid JSON"))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingTransport for MockTransport {
    async fn send(&self, text: String) -> Result<()> {
        if self.close_count() > 0 {
            return Err(Error::WebSocketError("connection closed".to_string()));
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! WebRTC peer connection engine backed by the `webrtc` crate

use super::engine::{
    EngineEvent, EngineEventSender, IceConnectionState, PeerEngine, PeerEngineFactory,
};
use crate::config::IceServerConfig;
use crate::signaling::protocol::{IceCandidate, SdpType, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

/// Creates [`RtcPeerEngine`]s sharing one WebRTC API instance
pub struct RtcEngineFactory {
    api: API,
}

impl RtcEngineFactory {
    /// Build the WebRTC API with default codecs and interceptors
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();

        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        Ok(Self { api })
    }
}

#[async_trait]
impl PeerEngineFactory for RtcEngineFactory {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: EngineEventSender,
    ) -> Result<Arc<dyn PeerEngine>> {
        let engine = RtcPeerEngine::new(&self.api, ice_servers, events).await?;
        Ok(Arc::new(engine))
    }
}

/// Peer connection engine wrapping a `webrtc::RTCPeerConnection`
pub struct RtcPeerEngine {
    peer_connection: Arc<RTCPeerConnection>,
}

impl RtcPeerEngine {
    /// Create a peer connection and bind its callbacks to `events`
    #[instrument(skip_all, fields(ice_servers = ice_servers.len()))]
    pub async fn new(
        api: &API,
        ice_servers: &[IceServerConfig],
        events: EngineEventSender,
    ) -> Result<Self> {
        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await.map_err(
            |e| Error::WebRtcError(format!("Failed to create peer connection: {}", e)),
        )?);

        let tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let event = match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => EngineEvent::LocalCandidate(Some(from_rtc_candidate(init))),
                        Err(e) => {
                            warn!("Failed to convert ICE candidate to JSON: {}", e);
                            return;
                        }
                    },
                    None => EngineEvent::LocalCandidate(None),
                };
                let _ = tx.send(event);
            })
        }));

        let tx = events.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(EngineEvent::Track {
                        kind: track.kind().to_string(),
                        track_id: track.id(),
                    });
                })
            },
        ));

        let tx = events;
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                let tx = tx.clone();
                Box::pin(async move {
                    if let Some(state) = from_rtc_ice_state(state) {
                        let _ = tx.send(EngineEvent::IceConnectionStateChange(state));
                    }
                })
            },
        ));

        Ok(Self { peer_connection })
    }

    /// Underlying WebRTC peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

#[async_trait]
impl PeerEngine for RtcPeerEngine {
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.peer_connection
            .set_local_description(description)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.peer_connection.local_description().await?;
        from_rtc_description(description).ok()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        debug!("Adding remote ICE candidate: {}", candidate.candidate);
        self.peer_connection
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection");
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close: {}", e)))
    }
}

fn to_rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    #[allow(clippy::needless_update)]
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(Error::SdpError("Rollback is not supported".to_string()));
        }
    };
    parsed.map_err(|e| Error::SdpError(format!("Invalid {} SDP: {}", description.sdp_type, e)))
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => {
            return Err(Error::SdpError(format!(
                "Unexpected session description type: {}",
                other
            )));
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn to_rtc_candidate(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn from_rtc_ice_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    Some(match state {
        RTCIceConnectionState::New => IceConnectionState::New,
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => return None,
    })
}

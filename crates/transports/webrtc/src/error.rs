//! Error types for the signaling relay

/// Result type alias using the relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in signaling relay operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling protocol error
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidateError(String),

    /// Peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The session was closed while an operation was pending
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// The registry is at its configured session limit
    #[error("Session limit reached: {0}")]
    CapacityExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error came from the peer connection engine
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerConnectionError(_)
                | Error::IceCandidateError(_)
                | Error::SdpError(_)
                | Error::WebRtcError(_)
        )
    }

    /// Check if this error only reports that the session is already gone
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Error::SessionClosed(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::WebRtcError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(Error::InvalidConfig("test".to_string()).is_config_error());
        assert!(!Error::SignalingError("test".to_string()).is_config_error());
    }

    #[test]
    fn test_error_is_peer_error() {
        assert!(Error::SdpError("test".to_string()).is_peer_error());
        assert!(Error::IceCandidateError("test".to_string()).is_peer_error());
        assert!(!Error::SessionClosed("test".to_string()).is_peer_error());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::from(json_err);
        assert!(matches!(err, Error::SerializationError(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
    }
}

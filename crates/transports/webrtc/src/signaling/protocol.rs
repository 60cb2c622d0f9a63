//! Signaling wire protocol
//!
//! JSON text messages discriminated by `type`:
//!
//! ```json
//! {"type": "offer", "offer": {"type": "offer", "sdp": "v=0..."}}
//! {"type": "answer", "answer": {"type": "answer", "sdp": "v=0..."}}
//! {"type": "candidate", "candidate": {"candidate": "candidate:...", "sdpMid": "0", "sdpMLineIndex": 0}}
//! ```
//!
//! The field layout of session descriptions and candidates matches the
//! browser's `RTCSessionDescriptionInit` / `RTCIceCandidateInit`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// SDP description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SdpType::Offer => "offer",
            SdpType::Pranswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Session description (`{type, sdp}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// A signaling message exchanged with the remote peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Remote peer's offer (inbound)
    Offer { offer: SessionDescription },
    /// Answer to an offer (inbound or outbound)
    Answer { answer: SessionDescription },
    /// Trickled ICE candidate (both directions)
    Candidate { candidate: IceCandidate },
}

impl SignalingMessage {
    /// Parse a text frame. Unknown `type` values and missing fields are
    /// reported as [`Error::SignalingError`].
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::SignalingError(format!("Invalid signaling message: {}", e)))
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Message kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_offer() {
        let msg = SignalingMessage::parse(
            r#"{"type":"offer","offer":{"type":"offer","sdp":"v=0\r\n"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            SignalingMessage::Offer {
                offer: SessionDescription::offer("v=0\r\n")
            }
        );
        assert_eq!(msg.kind(), "offer");
    }

    #[test]
    fn test_parse_browser_candidate() {
        let msg = SignalingMessage::parse(
            r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"abcd"}}"#,
        )
        .unwrap();

        let SignalingMessage::Candidate { candidate } = msg else {
            panic!("Expected candidate message");
        };
        assert!(candidate.candidate.starts_with("candidate:1"));
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_mline_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(SignalingMessage::parse(r#"{"type":"hello","peerId":"x"}"#).is_err());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        assert!(SignalingMessage::parse(r#"{"type":"offer"}"#).is_err());
        assert!(SignalingMessage::parse(r#"{"type":"answer","offer":{}}"#).is_err());
        assert!(SignalingMessage::parse(r#"{"type":"candidate","candidate":null}"#).is_err());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(matches!(
            SignalingMessage::parse("not json"),
            Err(Error::SignalingError(_))
        ));
        assert!(SignalingMessage::parse(r#"{"offer":{"type":"offer","sdp":""}}"#).is_err());
    }

    #[test]
    fn test_answer_wire_shape() {
        let msg = SignalingMessage::Answer {
            answer: SessionDescription::answer("v=0"),
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "answer", "answer": {"type": "answer", "sdp": "v=0"}})
        );
    }

    #[test]
    fn test_candidate_wire_shape() {
        let msg = SignalingMessage::Candidate {
            candidate: IceCandidate {
                candidate: "candidate:0 1 UDP 1 10.0.0.1 9 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            },
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "candidate");
        assert_eq!(value["candidate"]["sdpMid"], "0");
        assert_eq!(value["candidate"]["sdpMLineIndex"], 0);
        assert!(value["candidate"].get("usernameFragment").is_none());
    }
}

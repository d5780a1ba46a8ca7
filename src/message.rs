//! Signaling message schema carried over the push transport.
//!
//! Every message is a JSON object keyed by `type` and carries the `callId`
//! of the call attempt it belongs to, so receivers can reject stale or
//! duplicate deliveries from calls they are no longer tracking.

use serde::{Deserialize, Serialize};

use crate::error::CallError;

/// Opaque identifier for one call attempt, supplied by the initiating side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random 32-character uppercase hex call ID.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a peer on the push transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerToken(String);

impl PeerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller metadata surfaced to the callee while ringing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub name: String,
    pub handle: String,
}

/// Kind of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// SDP-style session description exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A single ICE candidate exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate string, e.g. `candidate:1 1 UDP 2130706431 192.168.1.1 8888 typ host`.
    pub candidate: String,
    /// SDP media stream identification.
    pub sdp_mid: Option<String>,
    /// SDP media line index.
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }
}

/// Push-delivered signaling message, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Initial call offer. Carries the caller's transport address so the
    /// callee knows where to route replies.
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        call_id: CallId,
        caller_name: String,
        handle: String,
        peer_token: PeerToken,
        #[serde(skip_serializing_if = "Option::is_none")]
        rtc_message: Option<SessionDescription>,
    },

    /// Answer to a previously delivered offer.
    #[serde(rename_all = "camelCase")]
    Answer { call_id: CallId, sdp: String },

    /// A connectivity candidate. May arrive in any order relative to the
    /// description that licenses it.
    #[serde(rename_all = "camelCase")]
    Candidate {
        call_id: CallId,
        #[serde(flatten)]
        candidate: IceCandidate,
    },

    /// The callee declined without answering.
    #[serde(rename_all = "camelCase")]
    Decline { call_id: CallId },

    /// Either side hung up.
    #[serde(rename_all = "camelCase")]
    Hangup { call_id: CallId },
}

impl SignalMessage {
    /// The call this message belongs to.
    pub fn call_id(&self) -> &CallId {
        match self {
            Self::IncomingCall { call_id, .. }
            | Self::Answer { call_id, .. }
            | Self::Candidate { call_id, .. }
            | Self::Decline { call_id }
            | Self::Hangup { call_id } => call_id,
        }
    }

    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncomingCall { .. } => "incoming-call",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::Decline { .. } => "decline",
            Self::Hangup { .. } => "hangup",
        }
    }

    /// Negotiation cannot proceed if this message is lost. Critical messages
    /// get a bounded delivery retry; everything else is fire-and-forget.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::IncomingCall { .. } | Self::Answer { .. })
    }

    /// Serialize to a JSON push payload.
    pub fn encode(&self) -> Result<Vec<u8>, CallError> {
        serde_json::to_vec(self).map_err(|e| CallError::Protocol(e.to_string()))
    }

    /// Parse a received push payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CallError> {
        serde_json::from_slice(payload).map_err(|e| CallError::Protocol(e.to_string()))
    }
}

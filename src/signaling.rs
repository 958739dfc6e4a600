//! Signaling transport seam
//!
//! The coordinator owns no wire format of its own. Connection-setup
//! metadata (offers, answers, ICE candidates) and call-control signals are
//! exchanged through a [`SignalingTransport`] implementation, which also
//! owns the peer connection and the outgoing video source. The concrete
//! transport in the application routes these through a backend message
//! store; tests use an in-memory mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::{CallId, CallType};
use crate::error::CallResult;
use crate::media::VideoSource;

/// Kind of a session description in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description produced by the transport's peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

/// Payload of one signaling message
///
/// ICE candidates stay opaque to the coordinator; they are forwarded to
/// the transport untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    /// Invitation to a call, carrying the initiator's session description
    Offer {
        call_type: CallType,
        sdp: String,
    },
    /// Acceptance of an offer, carrying the answering session description
    Answer { sdp: String },
    /// The remote device has started alerting its user
    Ringing,
    /// Opaque ICE candidate for the transport
    IceCandidate { candidate: serde_json::Value },
    /// The remote party ended or declined the call
    Hangup { reason: Option<String> },
    /// The remote party already has an active call
    Busy,
}

/// One signaling message, tagged with the call it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Call this message belongs to
    pub call_id: CallId,
    /// Opaque identifier of the sending peer
    pub from: String,
    pub payload: SignalPayload,
}

/// External signaling and peer-connection capability
///
/// Implementations own the peer connection; the coordinator only drives
/// the offer/answer flow and forwards opaque candidates. All methods may
/// suspend but must not block.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Create a local session description offering a call of the given type
    async fn create_offer(&self, call_type: CallType) -> CallResult<SessionDescription>;

    /// Create a local session description answering `remote_offer`
    async fn create_answer(
        &self,
        call_type: CallType,
        remote_offer: &SessionDescription,
    ) -> CallResult<SessionDescription>;

    /// Deliver a signaling message to the remote peer of `call_id`
    async fn send_signal(&self, call_id: CallId, to: &str, payload: SignalPayload)
        -> CallResult<()>;

    /// Apply the remote party's answer to the pending local offer,
    /// completing negotiation for an outgoing call
    async fn apply_remote_answer(&self, answer: &SessionDescription) -> CallResult<()>;

    /// Feed a remote ICE candidate into the peer connection
    async fn add_remote_candidate(&self, candidate: serde_json::Value) -> CallResult<()>;

    /// Replace the outgoing video source in place, renegotiating the
    /// existing peer connection (camera vs. screen capture)
    async fn replace_video_source(&self, source: VideoSource) -> CallResult<()>;

    /// Tear down the peer connection for the current call, if any
    async fn close_peer(&self) -> CallResult<()>;
}

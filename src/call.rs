//! Call session data model
//!
//! This module provides the call state machine, session attributes and the
//! lightweight per-call ledger entry kept by the coordinator. All actual
//! signaling and media operations are delegated to the external
//! [`SignalingTransport`](crate::signaling::SignalingTransport) and
//! [`MediaCapture`](crate::media::MediaCapture) collaborators.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Unique identifier for a call, shared with the remote peer via signaling
pub type CallId = Uuid;

/// Current phase of a call session
///
/// Transitions are monotonic except for the terminal states, which reset to
/// [`CallState::Idle`] after the end-of-call grace period. There is no
/// direct `Idle -> Connected` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No active session; ready to place or receive a call
    Idle,
    /// Local media is being acquired and an offer or answer is in flight
    Connecting,
    /// Awaiting the remote party (outgoing) or the local user (incoming)
    Ringing,
    /// Call is established and media is flowing
    Connected,
    /// Call has ended; resets to `Idle` after the grace period
    Ended,
    /// Unrecoverable signaling or media failure; resets to `Idle` after the grace period
    Failed,
}

impl CallState {
    /// Check if the call is established and media can flow
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Connected)
    }

    /// Check if the call has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended | CallState::Failed)
    }

    /// Check if the call is still in progress (not idle, not terminal)
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, CallState::Idle) && !self.is_terminal()
    }

    /// Whether a transition from this state to `next` is legal
    ///
    /// `Failed` is reachable from any non-idle state; everything else moves
    /// forward through the lifecycle only.
    pub fn can_transition_to(&self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Idle, Connecting) | (Idle, Ringing) => true,
            (Connecting, Ringing) | (Connecting, Connected) => true,
            (Ringing, Connecting) | (Ringing, Connected) => true,
            (Connecting, Ended) | (Ringing, Ended) | (Connected, Ended) => true,
            // Media-acquisition failures abort straight back to Idle
            (Connecting, Idle) => true,
            (Ended, Idle) | (Failed, Idle) => true,
            (_, Failed) => !matches!(self, Idle),
            _ => false,
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Connecting => "connecting",
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
            CallState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Media composition of a call, immutable for the session lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallType {
    /// Microphone only
    Audio,
    /// Camera and microphone
    Video,
}

impl CallType {
    /// Whether this call carries a video track
    pub fn has_video(&self) -> bool {
        matches!(self, CallType::Video)
    }
}

/// Direction of a call from this coordinator's perspective
///
/// Determines which party produces the media offer versus the answer, and
/// replaces ad hoc "did we initiate this" bookkeeping in the view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// Locally initiated call
    Outgoing,
    /// Call received from the remote peer
    Incoming,
}

/// User-visible media flags for the active session
///
/// Each flag is independent; every toggle is idempotent and reversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFlags {
    /// Microphone track disabled
    pub muted: bool,
    /// Camera track disabled (not released, so re-enable needs no renegotiation)
    pub camera_off: bool,
    /// Speakerphone routing active
    pub speaker_on: bool,
    /// Outgoing video replaced by a screen-capture source
    pub screen_sharing: bool,
}

impl Default for MediaFlags {
    fn default() -> Self {
        Self {
            muted: false,
            camera_off: false,
            // Hands-free is the expected default for this application
            speaker_on: true,
            screen_sharing: false,
        }
    }
}

/// Ledger entry describing one call, active or historical
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Unique call identifier
    pub call_id: CallId,
    /// Audio-only or audio+video
    pub call_type: CallType,
    /// Direction of the call
    pub direction: CallDirection,
    /// Current state of the call
    pub state: CallState,
    /// Opaque identifier of the remote party
    pub remote_peer: String,
    /// When the call was created
    pub created_at: DateTime<Utc>,
    /// When the call was connected (if it ever was)
    pub connected_at: Option<DateTime<Utc>>,
    /// When the call ended (if it has)
    pub ended_at: Option<DateTime<Utc>>,
    /// Media flags at last update
    pub flags: MediaFlags,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

/// Aggregate counters over the call ledger
#[derive(Debug, Clone, Default)]
pub struct CallStats {
    /// Calls handled since the coordinator was created
    pub total_calls: usize,
    /// Calls that reached `Connected`
    pub connected_calls: usize,
    /// Calls that ended in `Failed`
    pub failed_calls: usize,
    /// Incoming calls that rang out without being answered
    pub missed_calls: usize,
}

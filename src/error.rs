//! Error types for call coordination
//!
//! Errors are grouped to match how callers recover from them:
//!
//! - **Media errors** - camera/microphone acquisition problems; surfaced
//!   synchronously so the caller can show a message and stay off the call
//!   screen. Never retried by the coordinator.
//! - **Signaling errors** - the transport could not deliver or negotiate;
//!   before `Connected` these are synchronous failures, afterwards they
//!   drive the session to `Failed` and arrive via the state-change stream.
//! - **State errors** - an operation was attempted in an incompatible
//!   state (answering with a stale id, starting a call while busy).
//!
//! Nothing is retried automatically; every retry is a fresh user-initiated
//! `start_call`.

use thiserror::Error;
use crate::call::{CallId, CallState};

/// Result type alias for call coordination operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors produced by the call session coordinator
#[derive(Error, Debug, Clone)]
pub enum CallError {
    /// Camera or microphone could not be acquired
    #[error("Media acquisition failed: {reason}")]
    MediaAcquisitionFailed { reason: String },

    /// The signaling transport failed to deliver or process a message
    #[error("Signaling failed: {reason}")]
    SignalingFailed { reason: String },

    /// Peer connection setup or renegotiation failed
    #[error("Negotiation failed: {reason}")]
    NegotiationFailed { reason: String },

    /// Operation attempted in an incompatible session state
    #[error("Invalid call state for call {call_id}: current state is {current_state:?}")]
    InvalidCallState {
        call_id: CallId,
        current_state: CallState,
    },

    /// No session matches the given call id
    #[error("Call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// A session-scoped operation was attempted with no active session
    #[error("No active call session")]
    NoActiveSession,

    /// A new call was requested while another session is active
    #[error("Busy: call {active_call_id} is already active")]
    Busy { active_call_id: CallId },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl CallError {
    /// Create a media acquisition error
    pub fn media_acquisition_failed(reason: impl Into<String>) -> Self {
        Self::MediaAcquisitionFailed { reason: reason.into() }
    }

    /// Create a signaling error
    pub fn signaling_failed(reason: impl Into<String>) -> Self {
        Self::SignalingFailed { reason: reason.into() }
    }

    /// Create a negotiation error
    pub fn negotiation_failed(reason: impl Into<String>) -> Self {
        Self::NegotiationFailed { reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Whether a fresh user-initiated attempt could plausibly succeed
    ///
    /// The coordinator itself never retries; this informs the UI whether a
    /// "try again" affordance makes sense.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CallError::SignalingFailed { .. }
            | CallError::NegotiationFailed { .. }
            | CallError::Busy { .. } => true,

            CallError::MediaAcquisitionFailed { .. }
            | CallError::InvalidCallState { .. }
            | CallError::CallNotFound { .. }
            | CallError::NoActiveSession
            | CallError::InternalError { .. } => false,
        }
    }

    /// Error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            CallError::MediaAcquisitionFailed { .. } => "media",
            CallError::SignalingFailed { .. } | CallError::NegotiationFailed { .. } => "signaling",
            CallError::InvalidCallState { .. }
            | CallError::CallNotFound { .. }
            | CallError::NoActiveSession
            | CallError::Busy { .. } => "state",
            CallError::InternalError { .. } => "system",
        }
    }
}

//! Event types broadcast by the coordinator
//!
//! The coordinator pushes state changes, stream bindings and media events
//! to any number of observers. Observers either subscribe to the broadcast
//! channels on [`CallSessionCoordinator`](crate::CallSessionCoordinator)
//! or register a [`CallEventHandler`]; each subscriber receives every
//! event from the point of subscription onward, with no replay of past
//! events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{CallDirection, CallId, CallState, CallType};
use crate::error::CallError;
use crate::media::MediaStreamHandle;

/// Details of an incoming call awaiting a local decision
#[derive(Debug, Clone)]
pub struct IncomingCallInfo {
    pub call_id: CallId,
    /// Opaque identifier of the calling peer
    pub caller_id: String,
    pub call_type: CallType,
    pub created_at: DateTime<Utc>,
}

/// One observed state transition of the active session
#[derive(Debug, Clone)]
pub struct CallStateChangeInfo {
    pub call_id: CallId,
    pub new_state: CallState,
    pub previous_state: CallState,
    pub direction: CallDirection,
    /// Human-readable cause ("peer hangup", "ring timeout", ...)
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Current binding of the local or remote media stream
///
/// `None` means the binding was cleared (stream released or peer gone).
#[derive(Debug, Clone)]
pub struct MediaBinding {
    pub call_id: CallId,
    pub stream: Option<MediaStreamHandle>,
    pub timestamp: DateTime<Utc>,
}

/// Media-control state changes for the active session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaEventType {
    MicrophoneStateChanged { muted: bool },
    CameraStateChanged { camera_off: bool },
    SpeakerStateChanged { speaker_on: bool },
    CameraSwitched,
    ScreenSharingChanged { screen_sharing: bool },
}

/// A media event together with its call and timestamp
#[derive(Debug, Clone)]
pub struct MediaEventInfo {
    pub call_id: CallId,
    pub event_type: MediaEventType,
    pub timestamp: DateTime<Utc>,
}

/// Everything the coordinator can tell its observers
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// An incoming offer was observed; the session is now `Ringing`
    IncomingCall { info: IncomingCallInfo },
    /// The active session changed state
    CallStateChanged { info: CallStateChangeInfo },
    /// The local media stream binding changed
    LocalStreamChanged { binding: MediaBinding },
    /// The remote media stream binding changed
    RemoteStreamChanged { binding: MediaBinding },
    /// A media flag was toggled
    MediaEvent { info: MediaEventInfo },
    /// The session is `Connected` with both stream bindings stable; safe
    /// to present the call view without a fixed delay
    SessionReady { call_id: CallId },
    /// A failure surfaced asynchronously (after the original caller
    /// stopped listening synchronously)
    CallError {
        error: CallError,
        call_id: Option<CallId>,
    },
}

impl CoordinatorEvent {
    /// Call this event belongs to, if any
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            CoordinatorEvent::IncomingCall { info } => Some(info.call_id),
            CoordinatorEvent::CallStateChanged { info } => Some(info.call_id),
            CoordinatorEvent::LocalStreamChanged { binding } => Some(binding.call_id),
            CoordinatorEvent::RemoteStreamChanged { binding } => Some(binding.call_id),
            CoordinatorEvent::MediaEvent { info } => Some(info.call_id),
            CoordinatorEvent::SessionReady { call_id } => Some(*call_id),
            CoordinatorEvent::CallError { call_id, .. } => *call_id,
        }
    }
}

/// Push-style observer for coordinator events
///
/// Every method has a default empty body so implementors only override
/// what they care about. Handlers run on their own task and may call back
/// into the coordinator.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    async fn on_incoming_call(&self, _info: IncomingCallInfo) {}

    async fn on_call_state_changed(&self, _info: CallStateChangeInfo) {}

    async fn on_local_stream_changed(&self, _binding: MediaBinding) {}

    async fn on_remote_stream_changed(&self, _binding: MediaBinding) {}

    async fn on_media_event(&self, _info: MediaEventInfo) {}

    async fn on_session_ready(&self, _call_id: CallId) {}

    async fn on_call_error(&self, _error: CallError, _call_id: Option<CallId>) {}

    /// Dispatch a unified event to the specific callbacks
    async fn on_event(&self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::IncomingCall { info } => {
                self.on_incoming_call(info).await;
            }
            CoordinatorEvent::CallStateChanged { info } => {
                self.on_call_state_changed(info).await;
            }
            CoordinatorEvent::LocalStreamChanged { binding } => {
                self.on_local_stream_changed(binding).await;
            }
            CoordinatorEvent::RemoteStreamChanged { binding } => {
                self.on_remote_stream_changed(binding).await;
            }
            CoordinatorEvent::MediaEvent { info } => {
                self.on_media_event(info).await;
            }
            CoordinatorEvent::SessionReady { call_id } => {
                self.on_session_ready(call_id).await;
            }
            CoordinatorEvent::CallError { error, call_id } => {
                self.on_call_error(error, call_id).await;
            }
        }
    }
}

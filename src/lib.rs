//! # studypals-call-core
//!
//! Call session coordination layer for the StudyPals companion app. This
//! crate owns the lifecycle of a single peer-to-peer audio/video call:
//! the state machine, media-stream plumbing to and from a signaling
//! transport, and the in-call controls (mute, camera, speaker, screen
//! share). Rendering, navigation and the backing message store live
//! elsewhere; this crate only talks to them through trait seams and
//! broadcast channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │     UI (call screen,         │
//! │  incoming-call dialog, chat) │
//! └──────┬───────────────▲───────┘
//!        │ intents       │ broadcast events
//! ┌──────▼───────────────┴───────┐
//! │    CallSessionCoordinator    │  ◄── this crate
//! └──────┬───────────────┬───────┘
//!        │               │
//! ┌──────▼──────┐ ┌──────▼──────┐
//! │ Signaling   │ │ Media       │
//! │ Transport   │ │ Capture     │
//! └─────────────┘ └─────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use studypals_call_core::{
//!     CallSessionCoordinator, CallState, CallType, CoordinatorConfig,
//! };
//! use studypals_call_core::media::PlatformAudioRouter;
//! # use studypals_call_core::signaling::SignalingTransport;
//! # use studypals_call_core::media::MediaCapture;
//!
//! # async fn example(
//! #     transport: Arc<dyn SignalingTransport>,
//! #     capture: Arc<dyn MediaCapture>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = CallSessionCoordinator::new(
//!     CoordinatorConfig::default(),
//!     transport,
//!     capture,
//!     Arc::new(PlatformAudioRouter),
//! );
//!
//! // Observe the lifecycle from any number of places.
//! let mut states = coordinator.subscribe_state_changes();
//!
//! let call_id = coordinator.start_call("study-buddy-3", CallType::Video).await?;
//!
//! while let Ok(change) = states.recv().await {
//!     if change.new_state == CallState::Connected {
//!         coordinator.toggle_mute().await?;
//!         coordinator.end_call().await;
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Resource safety
//!
//! The local media stream is exclusively owned by the coordinator and its
//! tracks are stopped on every exit path - hangup, decline, setup failure,
//! transport failure and [`CallSessionCoordinator::shutdown`] - so camera
//! and microphone hardware locks never leak past the session.

pub mod call;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod media;
pub mod signaling;

pub use call::{CallDirection, CallId, CallInfo, CallState, CallStats, CallType, MediaFlags};
pub use coordinator::{CallSessionCoordinator, CoordinatorConfig};
pub use error::{CallError, CallResult};
pub use events::{
    CallEventHandler, CallStateChangeInfo, CoordinatorEvent, IncomingCallInfo, MediaBinding,
    MediaEventInfo, MediaEventType,
};
pub use media::{MediaStreamHandle, TrackKind, VideoSource};
pub use signaling::{SessionDescription, SignalMessage, SignalPayload, SignalingTransport};

//! Media capture and audio routing seams
//!
//! [`MediaCapture`] is the platform facility that grants access to camera
//! and microphone hardware. The local stream handle it returns is
//! exclusively owned by the coordinator and must be released on every exit
//! path; the remote stream is only ever a binding supplied by the
//! transport. [`AudioRouter`] covers device-level speakerphone routing,
//! which is outside the call state machine but tracked as a UI-visible
//! flag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CallResult;

/// A single audio or video component of a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Where the outgoing video track is sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoSource {
    /// A physical camera (front or rear)
    Camera,
    /// Screen capture
    Display,
}

/// Handle to a live media stream
///
/// For the local stream this is an ownership token: whoever holds it is
/// responsible for eventually passing it to [`MediaCapture::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamHandle {
    /// Platform identifier of the stream
    pub id: String,
    /// Whether the stream carries a video track
    pub has_video: bool,
}

/// External camera/microphone capability
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire a live local stream: microphone always, camera if `video`
    ///
    /// Fails when permission is denied or the hardware is busy. The
    /// coordinator reports that failure once and never retries.
    async fn acquire(&self, video: bool) -> CallResult<MediaStreamHandle>;

    /// Stop all tracks of `stream` and release the hardware locks
    async fn release(&self, stream: &MediaStreamHandle) -> CallResult<()>;

    /// Enable or disable one track of `stream` without releasing it
    async fn set_track_enabled(
        &self,
        stream: &MediaStreamHandle,
        kind: TrackKind,
        enabled: bool,
    ) -> CallResult<()>;

    /// Swap between the front and rear physical camera, preserving the
    /// active track binding
    async fn switch_camera(&self, stream: &MediaStreamHandle) -> CallResult<()>;
}

/// Device audio-routing capability (speakerphone vs. earpiece)
#[async_trait]
pub trait AudioRouter: Send + Sync {
    async fn set_speakerphone(&self, on: bool) -> CallResult<()>;
}

/// Audio router that accepts every request without touching any device
///
/// Useful on platforms where routing is handled elsewhere, and as the
/// default for tests.
#[derive(Debug, Default)]
pub struct PlatformAudioRouter;

#[async_trait]
impl AudioRouter for PlatformAudioRouter {
    async fn set_speakerphone(&self, on: bool) -> CallResult<()> {
        tracing::debug!("Audio route: speakerphone={}", on);
        Ok(())
    }
}

//! In-call media controls
//!
//! Flag toggles for the active session. Mute and camera-off disable the
//! corresponding track without releasing it, so re-enabling never needs
//! renegotiation; screen sharing swaps the outgoing video source on the
//! live peer connection. Each toggle is idempotent and reversible.

use std::sync::Arc;

use crate::call::CallState;
use crate::error::{CallError, CallResult};
use crate::events::MediaEventType;
use crate::media::{TrackKind, VideoSource};

use super::manager::CallSessionCoordinator;

impl CallSessionCoordinator {
    /// Flip the microphone mute flag and apply it to the live audio track
    pub async fn toggle_mute(self: &Arc<Self>) -> CallResult<()> {
        let mut guard = self.session.write().await;
        let session = guard
            .as_mut()
            .filter(|s| !s.state.is_terminal() && s.state != CallState::Idle)
            .ok_or(CallError::NoActiveSession)?;

        let muted = !session.flags.muted;
        if let Some(stream) = session.local_stream.as_ref() {
            self.media
                .set_track_enabled(stream, TrackKind::Audio, !muted)
                .await?;
        }
        session.flags.muted = muted;
        let call_id = session.call_id;
        self.sync_ledger_flags(session);

        self.emit_media_event(call_id, MediaEventType::MicrophoneStateChanged { muted })
            .await;
        tracing::info!("Call {} microphone muted={}", call_id, muted);
        Ok(())
    }

    /// Flip the camera-off flag and apply it to the live video track
    ///
    /// The track is disabled, never released, so turning the camera back
    /// on needs no renegotiation. No-op for audio-only sessions.
    pub async fn toggle_camera(self: &Arc<Self>) -> CallResult<()> {
        let mut guard = self.session.write().await;
        let session = guard
            .as_mut()
            .filter(|s| !s.state.is_terminal() && s.state != CallState::Idle)
            .ok_or(CallError::NoActiveSession)?;

        if !session.call_type.has_video() {
            tracing::debug!("Call {} has no video track, camera toggle ignored", session.call_id);
            return Ok(());
        }

        let camera_off = !session.flags.camera_off;
        if let Some(stream) = session.local_stream.as_ref() {
            self.media
                .set_track_enabled(stream, TrackKind::Video, !camera_off)
                .await?;
        }
        session.flags.camera_off = camera_off;
        let call_id = session.call_id;
        self.sync_ledger_flags(session);

        self.emit_media_event(call_id, MediaEventType::CameraStateChanged { camera_off })
            .await;
        tracing::info!("Call {} camera_off={}", call_id, camera_off);
        Ok(())
    }

    /// Swap between the front and rear physical camera
    ///
    /// The active track binding is preserved. No-op for audio-only sessions.
    pub async fn switch_camera(self: &Arc<Self>) -> CallResult<()> {
        let mut guard = self.session.write().await;
        let session = guard
            .as_mut()
            .filter(|s| !s.state.is_terminal() && s.state != CallState::Idle)
            .ok_or(CallError::NoActiveSession)?;

        if !session.call_type.has_video() {
            tracing::debug!("Call {} has no video track, camera switch ignored", session.call_id);
            return Ok(());
        }
        let Some(stream) = session.local_stream.as_ref() else {
            return Err(CallError::internal_error("no local stream to switch camera on"));
        };
        self.media.switch_camera(stream).await?;
        let call_id = session.call_id;

        self.emit_media_event(call_id, MediaEventType::CameraSwitched).await;
        tracing::info!("Call {} switched camera", call_id);
        Ok(())
    }

    /// Flip the speakerphone flag and re-route device audio
    pub async fn toggle_speaker(self: &Arc<Self>) -> CallResult<()> {
        let mut guard = self.session.write().await;
        let session = guard
            .as_mut()
            .filter(|s| !s.state.is_terminal() && s.state != CallState::Idle)
            .ok_or(CallError::NoActiveSession)?;

        let speaker_on = !session.flags.speaker_on;
        self.audio_router.set_speakerphone(speaker_on).await?;
        session.flags.speaker_on = speaker_on;
        let call_id = session.call_id;
        self.sync_ledger_flags(session);

        self.emit_media_event(call_id, MediaEventType::SpeakerStateChanged { speaker_on })
            .await;
        tracing::info!("Call {} speaker_on={}", call_id, speaker_on);
        Ok(())
    }

    /// Replace the outgoing video track with a screen-capture track
    ///
    /// Renegotiates the existing peer connection in place. Idempotent when
    /// already sharing; a no-op for audio-only sessions, whose flag stays
    /// `false`.
    pub async fn enable_screen_sharing(self: &Arc<Self>) -> CallResult<()> {
        self.set_screen_sharing(true).await
    }

    /// Revert the outgoing video track to the camera
    pub async fn disable_screen_sharing(self: &Arc<Self>) -> CallResult<()> {
        self.set_screen_sharing(false).await
    }

    async fn set_screen_sharing(self: &Arc<Self>, sharing: bool) -> CallResult<()> {
        let mut guard = self.session.write().await;
        let session = guard
            .as_mut()
            .filter(|s| !s.state.is_terminal() && s.state != CallState::Idle)
            .ok_or(CallError::NoActiveSession)?;

        if !session.call_type.has_video() {
            tracing::debug!("Call {} is audio-only, screen sharing ignored", session.call_id);
            return Ok(());
        }
        if session.flags.screen_sharing == sharing {
            // Already in the requested mode; no duplicate track replacement.
            return Ok(());
        }

        let source = if sharing {
            VideoSource::Display
        } else {
            VideoSource::Camera
        };
        self.transport.replace_video_source(source).await?;
        session.flags.screen_sharing = sharing;
        let call_id = session.call_id;
        self.sync_ledger_flags(session);

        self.emit_media_event(
            call_id,
            MediaEventType::ScreenSharingChanged {
                screen_sharing: sharing,
            },
        )
        .await;
        tracing::info!("Call {} screen_sharing={}", call_id, sharing);
        Ok(())
    }

    fn sync_ledger_flags(&self, session: &super::manager::ActiveSession) {
        if let Some(mut info) = self.call_info.get_mut(&session.call_id) {
            info.flags = session.flags;
        }
    }
}

//! Call lifecycle operations
//!
//! This module contains the lifecycle half of the coordinator: placing,
//! answering, declining and ending calls, plus the inbound plumbing that
//! feeds remote signals and stream bindings into the state machine.
//!
//! Every operation takes the session write lock for its whole duration,
//! including the awaits into the transport and capture collaborators, so
//! overlapping intents are serialized rather than interleaved. Two
//! concurrent `end_call`s are both safe (idempotence); a `start_call`
//! racing another sees the session already occupied and fails with
//! [`CallError::Busy`].
//!
//! # Failure semantics
//!
//! Media-acquisition and signaling failures during setup are returned
//! synchronously; the session resets straight to `Idle` and the caller
//! decides whether to retry. Failures after the call is connected drive
//! the session to `Failed` and surface through the state-change stream,
//! since by then the original caller may no longer be listening.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::call::{CallDirection, CallId, CallInfo, CallState, CallType, MediaFlags};
use crate::error::{CallError, CallResult};
use crate::events::{CoordinatorEvent, IncomingCallInfo};
use crate::media::MediaStreamHandle;
use crate::signaling::{SdpKind, SessionDescription, SignalMessage, SignalPayload};

use super::manager::{ActiveSession, CallSessionCoordinator};

impl CallSessionCoordinator {
    /// Place an outgoing call to `remote_peer`
    ///
    /// Transitions `Idle -> Connecting`, acquires local media (camera and
    /// microphone for video, microphone only for audio), and sends an
    /// offer tagged with a freshly generated call id. On any failure the
    /// session resets to `Idle` and the error is returned; the caller must
    /// surface it and must not navigate to a call view.
    ///
    /// # Errors
    ///
    /// * [`CallError::Busy`] - another session is active
    /// * [`CallError::MediaAcquisitionFailed`] - permission denied or hardware busy
    /// * [`CallError::SignalingFailed`] / [`CallError::NegotiationFailed`] -
    ///   the offer could not be produced or delivered
    pub async fn start_call(
        self: &Arc<Self>,
        remote_peer: impl Into<String>,
        call_type: CallType,
    ) -> CallResult<CallId> {
        let remote_peer = remote_peer.into();
        let mut guard = self.session.write().await;

        if let Some(existing) = guard.as_ref() {
            if existing.state.is_terminal() {
                // Still inside the end-of-call grace window; reset now
                // instead of reporting busy.
                let (call_id, state, direction) =
                    (existing.call_id, existing.state, existing.direction);
                *guard = None;
                self.emit_idle_reset(call_id, state, direction, None).await;
            } else {
                return Err(CallError::Busy {
                    active_call_id: existing.call_id,
                });
            }
        }

        let call_id = Uuid::new_v4();
        let mut session = ActiveSession {
            call_id,
            call_type,
            direction: CallDirection::Outgoing,
            remote_peer: remote_peer.clone(),
            state: CallState::Idle,
            flags: MediaFlags {
                speaker_on: self.config.speaker_on_by_default,
                ..MediaFlags::default()
            },
            local_stream: None,
            remote_stream: None,
            remote_offer: None,
            ready_announced: false,
        };
        self.record_call(&session, "start_call").await;
        self.transition(&mut session, CallState::Connecting, None).await;
        *guard = Some(session);

        // Local media first; without it there is nothing to offer.
        let stream = match self.media.acquire(call_type.has_video()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Call {} aborted, media acquisition failed: {}", call_id, e);
                self.abort_setup(&mut guard, "media acquisition failed").await;
                return Err(e);
            }
        };
        let session = guard.as_mut().ok_or_else(|| {
            CallError::internal_error("session vanished during setup")
        })?;
        session.local_stream = Some(stream.clone());
        self.emit_local_binding(call_id, Some(stream)).await;

        let offer = match self.transport.create_offer(call_type).await {
            Ok(offer) => offer,
            Err(e) => {
                tracing::warn!("Call {} aborted, offer creation failed: {}", call_id, e);
                self.abort_setup(&mut guard, "offer creation failed").await;
                return Err(e);
            }
        };

        let payload = SignalPayload::Offer {
            call_type,
            sdp: offer.sdp,
        };
        if let Err(e) = self.transport.send_signal(call_id, &remote_peer, payload).await {
            tracing::warn!("Call {} aborted, offer delivery failed: {}", call_id, e);
            self.abort_setup(&mut guard, "offer delivery failed").await;
            return Err(e);
        }

        if let Err(e) = self
            .audio_router
            .set_speakerphone(self.config.speaker_on_by_default)
            .await
        {
            // Routing is cosmetic; the call proceeds on the default route.
            tracing::warn!("Call {} audio routing failed: {}", call_id, e);
        }

        self.arm_ring_timeout(call_id);

        tracing::info!("Started outgoing {:?} call {} to {}", call_type, call_id, remote_peer);
        Ok(call_id)
    }

    /// Answer the incoming call with the given id
    ///
    /// Requires an incoming session in `Ringing` whose id matches; a stale
    /// or mismatched id fails without any state transition, which makes
    /// the method safe to call from a dialog that has just been dismissed.
    ///
    /// # Errors
    ///
    /// * [`CallError::CallNotFound`] - no session, or the id does not match
    /// * [`CallError::InvalidCallState`] - the session is not an incoming ring
    /// * [`CallError::MediaAcquisitionFailed`] - local media unavailable;
    ///   the caller is declined and the session resets to `Idle`
    pub async fn answer_call(self: &Arc<Self>, call_id: CallId) -> CallResult<()> {
        let mut guard = self.session.write().await;

        {
            let session = guard
                .as_ref()
                .filter(|s| s.call_id == call_id)
                .ok_or(CallError::CallNotFound { call_id })?;
            if session.direction != CallDirection::Incoming
                || session.state != CallState::Ringing
            {
                return Err(CallError::InvalidCallState {
                    call_id,
                    current_state: session.state,
                });
            }
        }

        let session = guard.as_mut().ok_or(CallError::CallNotFound { call_id })?;
        let call_type = session.call_type;
        let remote_peer = session.remote_peer.clone();
        let remote_offer = session.remote_offer.clone().ok_or_else(|| {
            CallError::internal_error("incoming session has no stored offer")
        })?;

        self.transition(session, CallState::Connecting, None).await;

        let stream = match self.media.acquire(call_type.has_video()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Call {} answer aborted, media acquisition failed: {}", call_id, e);
                self.notify_hangup(call_id, &remote_peer, "media unavailable").await;
                self.abort_setup(&mut guard, "media acquisition failed").await;
                return Err(e);
            }
        };
        let session = guard.as_mut().ok_or_else(|| {
            CallError::internal_error("session vanished during answer")
        })?;
        session.local_stream = Some(stream.clone());
        self.emit_local_binding(call_id, Some(stream)).await;

        let answer = match self.transport.create_answer(call_type, &remote_offer).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Call {} answer aborted, negotiation failed: {}", call_id, e);
                self.notify_hangup(call_id, &remote_peer, "negotiation failed").await;
                self.abort_setup(&mut guard, "negotiation failed").await;
                return Err(e);
            }
        };
        let payload = SignalPayload::Answer { sdp: answer.sdp };
        if let Err(e) = self.transport.send_signal(call_id, &remote_peer, payload).await {
            tracing::warn!("Call {} answer aborted, answer delivery failed: {}", call_id, e);
            self.abort_setup(&mut guard, "answer delivery failed").await;
            return Err(e);
        }

        let session = guard.as_mut().ok_or_else(|| {
            CallError::internal_error("session vanished during answer")
        })?;
        self.transition(session, CallState::Connected, None).await;
        self.stats.lock().await.connected_calls += 1;

        let speaker_on = session.flags.speaker_on;
        if let Err(e) = self.audio_router.set_speakerphone(speaker_on).await {
            tracing::warn!("Call {} audio routing failed: {}", call_id, e);
        }
        self.maybe_announce_ready(session).await;

        tracing::info!("Answered call {}", call_id);
        Ok(())
    }

    /// Decline the incoming call with the given id
    ///
    /// Dismissing the incoming-call UI without answering maps here; the
    /// peer receives a hangup and any reserved resources are released.
    pub async fn decline_call(self: &Arc<Self>, call_id: CallId) -> CallResult<()> {
        let mut guard = self.session.write().await;

        let session = guard
            .as_ref()
            .filter(|s| s.call_id == call_id)
            .ok_or(CallError::CallNotFound { call_id })?;
        if session.direction != CallDirection::Incoming || session.state != CallState::Ringing {
            return Err(CallError::InvalidCallState {
                call_id,
                current_state: session.state,
            });
        }

        self.terminate_locked(&mut guard, true, false, "declined").await;
        tracing::info!("Declined call {}", call_id);
        Ok(())
    }

    /// End the active call, whatever its state
    ///
    /// Idempotent: with no active session, or one already terminal, this
    /// is a no-op. Otherwise local media is released, the peer is
    /// notified, and the session moves to `Ended` and then (after the
    /// grace period) back to `Idle`.
    pub async fn end_call(self: &Arc<Self>) {
        let mut guard = self.session.write().await;
        match guard.as_ref() {
            None => {}
            Some(session) if session.state.is_terminal() => {
                tracing::debug!("Call {} already ended, skipping hangup", session.call_id);
            }
            Some(session) => {
                let call_id = session.call_id;
                self.terminate_locked(&mut guard, true, false, "user hangup").await;
                tracing::info!("Hung up call {}", call_id);
            }
        }
    }

    // ===== INBOUND PLUMBING =====

    /// Feed one signaling message from the transport into the state machine
    pub async fn handle_signal(self: &Arc<Self>, msg: SignalMessage) {
        let mut guard = self.session.write().await;
        match msg.payload {
            SignalPayload::Offer { call_type, sdp } => {
                self.handle_incoming_offer(&mut guard, msg.call_id, msg.from, call_type, sdp)
                    .await;
            }
            SignalPayload::Ringing => {
                if let Some(session) = guard
                    .as_mut()
                    .filter(|s| s.call_id == msg.call_id)
                    .filter(|s| s.direction == CallDirection::Outgoing)
                    .filter(|s| s.state == CallState::Connecting)
                {
                    self.transition(session, CallState::Ringing, Some("peer ringing".into()))
                        .await;
                }
            }
            SignalPayload::Answer { sdp } => {
                let accepted = guard
                    .as_ref()
                    .filter(|s| s.call_id == msg.call_id)
                    .filter(|s| s.direction == CallDirection::Outgoing)
                    .filter(|s| {
                        matches!(s.state, CallState::Connecting | CallState::Ringing)
                    })
                    .is_some();
                if !accepted {
                    tracing::debug!("Ignoring answer for unknown call {}", msg.call_id);
                    return;
                }
                let answer = SessionDescription {
                    kind: SdpKind::Answer,
                    sdp,
                };
                if let Err(e) = self.transport.apply_remote_answer(&answer).await {
                    tracing::warn!("Call {} failed to apply remote answer: {}", msg.call_id, e);
                    self.terminate_locked(&mut guard, false, true, "answer negotiation failed")
                        .await;
                    self.emit_event(CoordinatorEvent::CallError {
                        error: e,
                        call_id: Some(msg.call_id),
                    })
                    .await;
                } else if let Some(session) = guard.as_mut() {
                    self.transition(session, CallState::Connected, Some("peer answered".into()))
                        .await;
                    self.stats.lock().await.connected_calls += 1;
                    self.maybe_announce_ready(session).await;
                }
            }
            SignalPayload::IceCandidate { candidate } => {
                if guard.as_ref().map(|s| s.call_id) == Some(msg.call_id) {
                    // Candidate failures are not fatal; the connection can
                    // complete over the remaining pairs.
                    if let Err(e) = self.transport.add_remote_candidate(candidate).await {
                        tracing::warn!("Call {} candidate rejected: {}", msg.call_id, e);
                    }
                }
            }
            SignalPayload::Hangup { reason } => {
                if guard.as_ref().map(|s| s.call_id) == Some(msg.call_id) {
                    let reason = reason.unwrap_or_else(|| "peer hangup".to_string());
                    self.terminate_locked(&mut guard, false, false, &reason).await;
                    tracing::info!("Call {} ended by peer", msg.call_id);
                }
            }
            SignalPayload::Busy => {
                let in_setup = guard
                    .as_ref()
                    .map(|s| {
                        s.call_id == msg.call_id
                            && s.direction == CallDirection::Outgoing
                            && s.state.is_in_progress()
                    })
                    .unwrap_or(false);
                if in_setup {
                    self.terminate_locked(&mut guard, false, false, "peer busy").await;
                    tracing::info!("Call {} rejected, peer busy", msg.call_id);
                }
            }
        }
    }

    /// Bind or clear the remote media stream for `call_id`
    ///
    /// The coordinator never mutates the stream's contents, only its
    /// binding; observers receive the new binding on the remote stream
    /// channel.
    pub async fn handle_remote_stream(
        self: &Arc<Self>,
        call_id: CallId,
        stream: Option<MediaStreamHandle>,
    ) {
        let mut guard = self.session.write().await;
        let Some(session) = guard.as_mut().filter(|s| s.call_id == call_id) else {
            tracing::debug!("Ignoring remote stream for unknown call {}", call_id);
            return;
        };
        session.remote_stream = stream.clone();
        self.emit_remote_binding(call_id, stream).await;
        self.maybe_announce_ready(session).await;
    }

    /// Report an unrecoverable transport failure for the active session
    ///
    /// Drives the session to `Failed` (then `Idle` after the grace
    /// period). The coordinator never reconnects on its own; recovery is a
    /// fresh `start_call`.
    pub async fn handle_transport_failure(self: &Arc<Self>, reason: impl Into<String>) {
        let reason = reason.into();
        let mut guard = self.session.write().await;
        let Some(session) = guard.as_ref().filter(|s| !s.state.is_terminal()) else {
            return;
        };
        let call_id = session.call_id;
        tracing::error!("Call {} transport failure: {}", call_id, reason);
        self.terminate_locked(&mut guard, false, true, &reason).await;
        self.emit_event(CoordinatorEvent::CallError {
            error: CallError::signaling_failed(reason),
            call_id: Some(call_id),
        })
        .await;
    }

    // ===== INTERNAL =====

    async fn handle_incoming_offer(
        self: &Arc<Self>,
        guard: &mut Option<ActiveSession>,
        call_id: CallId,
        caller_id: String,
        call_type: CallType,
        sdp: String,
    ) {
        if let Some(existing) = guard.as_ref() {
            if existing.state.is_terminal() {
                let (old_id, state, direction) =
                    (existing.call_id, existing.state, existing.direction);
                *guard = None;
                self.emit_idle_reset(old_id, state, direction, None).await;
            } else {
                // One session at a time; the caller gets a deterministic
                // busy signal instead of silence.
                tracing::info!("Rejecting offer {} from {}: busy", call_id, caller_id);
                if let Err(e) = self
                    .transport
                    .send_signal(call_id, &caller_id, SignalPayload::Busy)
                    .await
                {
                    tracing::warn!("Failed to send busy signal for call {}: {}", call_id, e);
                }
                return;
            }
        }

        let mut session = ActiveSession {
            call_id,
            call_type,
            direction: CallDirection::Incoming,
            remote_peer: caller_id.clone(),
            state: CallState::Idle,
            flags: MediaFlags {
                speaker_on: self.config.speaker_on_by_default,
                ..MediaFlags::default()
            },
            local_stream: None,
            remote_stream: None,
            remote_offer: Some(SessionDescription {
                kind: SdpKind::Offer,
                sdp,
            }),
            ready_announced: false,
        };
        self.record_call(&session, "incoming_offer").await;
        self.transition(&mut session, CallState::Ringing, Some("incoming offer".into()))
            .await;
        let created_at = Utc::now();
        *guard = Some(session);

        // Tell the caller we are alerting; best effort.
        if let Err(e) = self
            .transport
            .send_signal(call_id, &caller_id, SignalPayload::Ringing)
            .await
        {
            tracing::warn!("Failed to send ringing signal for call {}: {}", call_id, e);
        }

        self.emit_event(CoordinatorEvent::IncomingCall {
            info: IncomingCallInfo {
                call_id,
                caller_id: caller_id.clone(),
                call_type,
                created_at,
            },
        })
        .await;

        self.arm_ring_timeout(call_id);
        tracing::info!("Incoming {:?} call {} from {}", call_type, call_id, caller_id);
    }

    /// Tear down the session while the write lock is held
    ///
    /// Releases the local stream exactly once, optionally notifies the
    /// peer, closes the peer connection and schedules the reset to `Idle`.
    /// No-op when the session is already terminal.
    pub(crate) async fn terminate_locked(
        self: &Arc<Self>,
        guard: &mut Option<ActiveSession>,
        notify_peer: bool,
        to_failed: bool,
        reason: &str,
    ) {
        let Some(session) = guard.as_mut() else {
            return;
        };
        if session.state.is_terminal() {
            return;
        }

        if let Some(stream) = session.local_stream.take() {
            if let Err(e) = self.media.release(&stream).await {
                tracing::warn!("Failed to release local media for call {}: {}", session.call_id, e);
            }
            self.emit_local_binding(session.call_id, None).await;
        }
        if session.remote_stream.take().is_some() {
            self.emit_remote_binding(session.call_id, None).await;
        }

        if notify_peer {
            let payload = SignalPayload::Hangup {
                reason: Some(reason.to_string()),
            };
            if let Err(e) = self
                .transport
                .send_signal(session.call_id, &session.remote_peer, payload)
                .await
            {
                tracing::warn!("Failed to notify peer of hangup for call {}: {}", session.call_id, e);
            }
        }
        if let Err(e) = self.transport.close_peer().await {
            tracing::warn!("Failed to close peer connection for call {}: {}", session.call_id, e);
        }

        let terminal = if to_failed {
            CallState::Failed
        } else {
            CallState::Ended
        };
        self.transition(session, terminal, Some(reason.to_string())).await;

        if to_failed {
            self.stats.lock().await.failed_calls += 1;
        }

        self.spawn_idle_reset(session.call_id, terminal, session.direction);
    }

    /// Abandon a session that never got past setup: release anything
    /// acquired, mark the ledger entry failed, reset straight to `Idle`
    async fn abort_setup(self: &Arc<Self>, guard: &mut Option<ActiveSession>, reason: &str) {
        let Some(mut session) = guard.take() else {
            return;
        };
        if let Some(stream) = session.local_stream.take() {
            if let Err(e) = self.media.release(&stream).await {
                tracing::warn!("Failed to release local media for call {}: {}", session.call_id, e);
            }
            self.emit_local_binding(session.call_id, None).await;
        }
        // The transport may already have spun up a peer connection for the
        // offer or answer; tear it down with the rest of the setup.
        if let Err(e) = self.transport.close_peer().await {
            tracing::warn!("Failed to close peer connection for call {}: {}", session.call_id, e);
        }
        if let Some(mut info) = self.call_info.get_mut(&session.call_id) {
            info.state = CallState::Failed;
            info.ended_at = Some(Utc::now());
            info.metadata
                .insert("failure_reason".to_string(), reason.to_string());
        }
        self.stats.lock().await.failed_calls += 1;
        self.emit_idle_reset(
            session.call_id,
            session.state,
            session.direction,
            Some(reason.to_string()),
        )
        .await;
    }

    /// Best-effort hangup notification outside the terminate path
    async fn notify_hangup(&self, call_id: CallId, remote_peer: &str, reason: &str) {
        let payload = SignalPayload::Hangup {
            reason: Some(reason.to_string()),
        };
        if let Err(e) = self.transport.send_signal(call_id, remote_peer, payload).await {
            tracing::warn!("Failed to notify peer of hangup for call {}: {}", call_id, e);
        }
    }

    /// Record a new ledger entry and bump the call counter
    async fn record_call(&self, session: &ActiveSession, via: &str) {
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("created_via".to_string(), via.to_string());
        self.call_info.insert(
            session.call_id,
            CallInfo {
                call_id: session.call_id,
                call_type: session.call_type,
                direction: session.direction,
                state: session.state,
                remote_peer: session.remote_peer.clone(),
                created_at: Utc::now(),
                connected_at: None,
                ended_at: None,
                flags: session.flags,
                metadata,
            },
        );
        self.stats.lock().await.total_calls += 1;
    }

    /// Terminate the session if it is still waiting to connect when the
    /// ring timeout expires
    fn arm_ring_timeout(self: &Arc<Self>, call_id: CallId) {
        let coordinator = Arc::clone(self);
        let timeout = self.config.ring_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut guard = coordinator.session.write().await;
            let waiting = guard
                .as_ref()
                .filter(|s| s.call_id == call_id)
                .filter(|s| matches!(s.state, CallState::Connecting | CallState::Ringing))
                .map(|s| s.direction);
            let Some(direction) = waiting else {
                return;
            };
            tracing::info!("Call {} rang out", call_id);
            coordinator
                .terminate_locked(&mut guard, true, false, "ring timeout")
                .await;
            if direction == CallDirection::Incoming {
                coordinator.stats.lock().await.missed_calls += 1;
            }
        });
    }

    /// After the grace period, clear the terminal session and announce `Idle`
    fn spawn_idle_reset(self: &Arc<Self>, call_id: CallId, from: CallState, direction: CallDirection) {
        let coordinator = Arc::clone(self);
        let grace = self.config.end_call_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut guard = coordinator.session.write().await;
            let still_terminal = guard
                .as_ref()
                .map(|s| s.call_id == call_id && s.state.is_terminal())
                .unwrap_or(false);
            if still_terminal {
                *guard = None;
                drop(guard);
                coordinator.emit_idle_reset(call_id, from, direction, None).await;
            }
        });
    }
}

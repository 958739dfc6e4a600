//! Unit tests for the coordinator over mock collaborators

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use crate::call::{CallId, CallState, CallType};
    use crate::coordinator::{CallSessionCoordinator, CoordinatorConfig};
    use crate::error::{CallError, CallResult};
    use crate::media::{
        AudioRouter, MediaCapture, MediaStreamHandle, TrackKind, VideoSource,
    };
    use crate::signaling::{
        SdpKind, SessionDescription, SignalMessage, SignalPayload, SignalingTransport,
    };

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<(CallId, String, SignalPayload)>>,
        fail_offer: AtomicBool,
        fail_send: AtomicBool,
        fail_apply_answer: AtomicBool,
        answers_applied: AtomicUsize,
        replace_count: AtomicUsize,
        close_count: AtomicUsize,
    }

    impl MockTransport {
        fn sent_payloads(&self) -> Vec<SignalPayload> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, _, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SignalingTransport for MockTransport {
        async fn create_offer(&self, _call_type: CallType) -> CallResult<SessionDescription> {
            if self.fail_offer.load(Ordering::SeqCst) {
                return Err(CallError::negotiation_failed("offer refused"));
            }
            Ok(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "v=0 offer".to_string(),
            })
        }

        async fn create_answer(
            &self,
            _call_type: CallType,
            _remote_offer: &SessionDescription,
        ) -> CallResult<SessionDescription> {
            Ok(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "v=0 answer".to_string(),
            })
        }

        async fn send_signal(
            &self,
            call_id: CallId,
            to: &str,
            payload: SignalPayload,
        ) -> CallResult<()> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(CallError::signaling_failed("transport unreachable"));
            }
            self.sent.lock().unwrap().push((call_id, to.to_string(), payload));
            Ok(())
        }

        async fn apply_remote_answer(&self, _answer: &SessionDescription) -> CallResult<()> {
            if self.fail_apply_answer.load(Ordering::SeqCst) {
                return Err(CallError::negotiation_failed("remote answer rejected"));
            }
            self.answers_applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn add_remote_candidate(&self, _candidate: serde_json::Value) -> CallResult<()> {
            Ok(())
        }

        async fn replace_video_source(&self, _source: VideoSource) -> CallResult<()> {
            self.replace_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close_peer(&self) -> CallResult<()> {
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockCapture {
        fail_acquire: AtomicBool,
        acquired: AtomicUsize,
        released: AtomicUsize,
        switches: AtomicUsize,
        track_enabled: Mutex<HashMap<TrackKind, bool>>,
    }

    impl MockCapture {
        fn track_is_enabled(&self, kind: TrackKind) -> bool {
            *self.track_enabled.lock().unwrap().get(&kind).unwrap_or(&true)
        }
    }

    #[async_trait]
    impl MediaCapture for MockCapture {
        async fn acquire(&self, video: bool) -> CallResult<MediaStreamHandle> {
            if self.fail_acquire.load(Ordering::SeqCst) {
                return Err(CallError::media_acquisition_failed("permission denied"));
            }
            let n = self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(MediaStreamHandle {
                id: format!("local-{}", n),
                has_video: video,
            })
        }

        async fn release(&self, _stream: &MediaStreamHandle) -> CallResult<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_track_enabled(
            &self,
            _stream: &MediaStreamHandle,
            kind: TrackKind,
            enabled: bool,
        ) -> CallResult<()> {
            self.track_enabled.lock().unwrap().insert(kind, enabled);
            Ok(())
        }

        async fn switch_camera(&self, _stream: &MediaStreamHandle) -> CallResult<()> {
            self.switches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockRouter {
        speaker_on: AtomicBool,
    }

    #[async_trait]
    impl AudioRouter for MockRouter {
        async fn set_speakerphone(&self, on: bool) -> CallResult<()> {
            self.speaker_on.store(on, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        coordinator: Arc<CallSessionCoordinator>,
        transport: Arc<MockTransport>,
        capture: Arc<MockCapture>,
        router: Arc<MockRouter>,
    }

    fn harness() -> Harness {
        harness_with(CoordinatorConfig::default())
    }

    fn harness_with(config: CoordinatorConfig) -> Harness {
        let transport = Arc::new(MockTransport::default());
        let capture = Arc::new(MockCapture::default());
        let router = Arc::new(MockRouter::default());
        let coordinator = CallSessionCoordinator::new(
            config,
            transport.clone(),
            capture.clone(),
            router.clone(),
        );
        Harness {
            coordinator,
            transport,
            capture,
            router,
        }
    }

    async fn connect_outgoing(h: &Harness, call_type: CallType) -> CallId {
        let call_id = h
            .coordinator
            .start_call("peer-1", call_type)
            .await
            .expect("start_call");
        h.coordinator
            .handle_signal(SignalMessage {
                call_id,
                from: "peer-1".to_string(),
                payload: SignalPayload::Answer {
                    sdp: "v=0 answer".to_string(),
                },
            })
            .await;
        assert_eq!(h.coordinator.current_state().await, CallState::Connected);
        call_id
    }

    async fn ring_incoming(h: &Harness, call_type: CallType) -> CallId {
        let call_id = CallId::new_v4();
        h.coordinator
            .handle_signal(SignalMessage {
                call_id,
                from: "peer-2".to_string(),
                payload: SignalPayload::Offer {
                    call_type,
                    sdp: "v=0 offer".to_string(),
                },
            })
            .await;
        assert_eq!(h.coordinator.current_state().await, CallState::Ringing);
        call_id
    }

    #[tokio::test]
    async fn start_call_is_rejected_while_busy() {
        let h = harness();
        let first = h.coordinator.start_call("peer-1", CallType::Audio).await.unwrap();

        let second = h.coordinator.start_call("peer-9", CallType::Audio).await;
        match second {
            Err(CallError::Busy { active_call_id }) => assert_eq!(active_call_id, first),
            other => panic!("expected busy, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn media_failure_resets_to_idle() {
        let h = harness();
        h.capture.fail_acquire.store(true, Ordering::SeqCst);

        let result = h.coordinator.start_call("peer-1", CallType::Video).await;
        assert!(matches!(result, Err(CallError::MediaAcquisitionFailed { .. })));
        assert_eq!(h.coordinator.current_state().await, CallState::Idle);
        assert_eq!(h.coordinator.current_call_id().await, None);
        // Nothing was acquired, so nothing to release.
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offer_delivery_failure_releases_media_and_resets() {
        let h = harness();
        h.transport.fail_send.store(true, Ordering::SeqCst);

        let result = h.coordinator.start_call("peer-1", CallType::Audio).await;
        assert!(matches!(result, Err(CallError::SignalingFailed { .. })));
        assert_eq!(h.coordinator.current_state().await, CallState::Idle);
        assert_eq!(h.capture.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
        // The peer connection spun up for the offer must not outlive the
        // aborted setup.
        assert_eq!(h.transport.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn answer_media_failure_declines_and_resets() {
        let h = harness();
        let call_id = ring_incoming(&h, CallType::Video).await;
        h.capture.fail_acquire.store(true, Ordering::SeqCst);

        let result = h.coordinator.answer_call(call_id).await;
        assert!(matches!(result, Err(CallError::MediaAcquisitionFailed { .. })));
        assert_eq!(h.coordinator.current_state().await, CallState::Idle);
        assert_eq!(h.coordinator.current_call_id().await, None);
        // Nothing was acquired, so nothing to release.
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 0);

        // The caller was told we are not coming.
        let payloads = h.transport.sent_payloads();
        assert!(payloads.iter().any(|p| matches!(p, SignalPayload::Hangup { .. })));
    }

    #[tokio::test]
    async fn mute_parity_follows_toggle_count() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;

        assert!(!h.coordinator.current_flags().await.unwrap().muted);
        for i in 1..=5 {
            assert_ok!(h.coordinator.toggle_mute().await);
            let muted = h.coordinator.current_flags().await.unwrap().muted;
            assert_eq!(muted, i % 2 == 1, "after {} toggles", i);
            assert_eq!(h.capture.track_is_enabled(TrackKind::Audio), !muted);
        }
    }

    #[tokio::test]
    async fn double_camera_toggle_is_net_noop() {
        let h = harness();
        connect_outgoing(&h, CallType::Video).await;

        assert_ok!(h.coordinator.toggle_camera().await);
        assert_ok!(h.coordinator.toggle_camera().await);

        let flags = h.coordinator.current_flags().await.unwrap();
        assert!(!flags.camera_off);
        assert!(h.capture.track_is_enabled(TrackKind::Video));
    }

    #[tokio::test]
    async fn camera_controls_are_noops_on_audio_calls() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;

        assert_ok!(h.coordinator.toggle_camera().await);
        assert!(!h.coordinator.current_flags().await.unwrap().camera_off);

        assert_ok!(h.coordinator.switch_camera().await);
        assert_eq!(h.capture.switches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn switch_camera_reaches_capture_on_video_calls() {
        let h = harness();
        connect_outgoing(&h, CallType::Video).await;

        assert_ok!(h.coordinator.switch_camera().await);
        assert_eq!(h.capture.switches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn screen_sharing_is_idempotent_and_video_only() {
        let h = harness();
        connect_outgoing(&h, CallType::Video).await;

        assert_ok!(h.coordinator.enable_screen_sharing().await);
        assert!(h.coordinator.current_flags().await.unwrap().screen_sharing);
        assert_eq!(h.transport.replace_count.load(Ordering::SeqCst), 1);

        // Second enable must not replace the track again.
        assert_ok!(h.coordinator.enable_screen_sharing().await);
        assert_eq!(h.transport.replace_count.load(Ordering::SeqCst), 1);

        assert_ok!(h.coordinator.disable_screen_sharing().await);
        assert!(!h.coordinator.current_flags().await.unwrap().screen_sharing);
        assert_eq!(h.transport.replace_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn screen_sharing_rejected_for_audio_sessions() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;

        assert_ok!(h.coordinator.enable_screen_sharing().await);
        assert!(!h.coordinator.current_flags().await.unwrap().screen_sharing);
        assert_eq!(h.transport.replace_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn speaker_defaults_on_and_toggles_route() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;

        let flags = h.coordinator.current_flags().await.unwrap();
        assert!(flags.speaker_on);
        assert!(h.router.speaker_on.load(Ordering::SeqCst));

        assert_ok!(h.coordinator.toggle_speaker().await);
        assert!(!h.coordinator.current_flags().await.unwrap().speaker_on);
        assert!(!h.router.speaker_on.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn answer_with_mismatched_id_changes_nothing() {
        let h = harness();
        ring_incoming(&h, CallType::Audio).await;

        let result = h.coordinator.answer_call(CallId::new_v4()).await;
        assert!(matches!(result, Err(CallError::CallNotFound { .. })));
        assert_eq!(h.coordinator.current_state().await, CallState::Ringing);
        assert_eq!(h.capture.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answer_connects_an_incoming_ring() {
        let h = harness();
        let call_id = ring_incoming(&h, CallType::Video).await;

        assert_ok!(h.coordinator.answer_call(call_id).await);
        assert_eq!(h.coordinator.current_state().await, CallState::Connected);
        assert_eq!(h.coordinator.current_call_type().await, Some(CallType::Video));

        let payloads = h.transport.sent_payloads();
        assert!(payloads.iter().any(|p| matches!(p, SignalPayload::Answer { .. })));
    }

    #[tokio::test]
    async fn answer_is_not_valid_twice() {
        let h = harness();
        let call_id = ring_incoming(&h, CallType::Audio).await;
        assert_ok!(h.coordinator.answer_call(call_id).await);

        let again = h.coordinator.answer_call(call_id).await;
        assert!(matches!(
            again,
            Err(CallError::InvalidCallState {
                current_state: CallState::Connected,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn decline_notifies_peer_and_ends() {
        let h = harness();
        let call_id = ring_incoming(&h, CallType::Audio).await;

        assert_ok!(h.coordinator.decline_call(call_id).await);
        assert_eq!(h.coordinator.current_state().await, CallState::Ended);
        // No media was reserved for the unanswered ring.
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 0);

        let payloads = h.transport.sent_payloads();
        assert!(payloads.iter().any(|p| matches!(p, SignalPayload::Hangup { .. })));
    }

    #[tokio::test]
    async fn end_call_releases_media_exactly_once() {
        let h = harness();
        connect_outgoing(&h, CallType::Video).await;
        assert_eq!(h.capture.acquired.load(Ordering::SeqCst), 1);

        h.coordinator.end_call().await;
        h.coordinator.end_call().await;
        h.coordinator.end_call().await;

        assert_eq!(h.coordinator.current_state().await, CallState::Ended);
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn end_call_with_no_session_is_a_noop() {
        let h = harness();
        h.coordinator.end_call().await;
        assert_eq!(h.coordinator.current_state().await, CallState::Idle);
    }

    #[tokio::test]
    async fn offer_while_busy_gets_busy_signal() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;

        let intruder = CallId::new_v4();
        h.coordinator
            .handle_signal(SignalMessage {
                call_id: intruder,
                from: "peer-3".to_string(),
                payload: SignalPayload::Offer {
                    call_type: CallType::Audio,
                    sdp: "v=0 offer".to_string(),
                },
            })
            .await;

        // Active session untouched; the intruder was told busy.
        assert_ne!(h.coordinator.current_call_id().await, Some(intruder));
        assert_eq!(h.coordinator.current_state().await, CallState::Connected);
        let busy_to_intruder = h
            .transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|(id, to, p)| *id == intruder && to == "peer-3" && *p == SignalPayload::Busy);
        assert!(busy_to_intruder);
    }

    #[tokio::test]
    async fn peer_hangup_tears_down_the_session() {
        let h = harness();
        let call_id = connect_outgoing(&h, CallType::Audio).await;

        h.coordinator
            .handle_signal(SignalMessage {
                call_id,
                from: "peer-1".to_string(),
                payload: SignalPayload::Hangup { reason: None },
            })
            .await;

        assert_eq!(h.coordinator.current_state().await, CallState::Ended);
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outgoing_sees_peer_ringing_then_connected() {
        let h = harness();
        let call_id = h.coordinator.start_call("peer-1", CallType::Audio).await.unwrap();
        assert_eq!(h.coordinator.current_state().await, CallState::Connecting);

        h.coordinator
            .handle_signal(SignalMessage {
                call_id,
                from: "peer-1".to_string(),
                payload: SignalPayload::Ringing,
            })
            .await;
        assert_eq!(h.coordinator.current_state().await, CallState::Ringing);

        h.coordinator
            .handle_signal(SignalMessage {
                call_id,
                from: "peer-1".to_string(),
                payload: SignalPayload::Answer { sdp: "v=0".to_string() },
            })
            .await;
        assert_eq!(h.coordinator.current_state().await, CallState::Connected);
    }

    #[tokio::test]
    async fn remote_answer_is_applied_to_the_transport() {
        let h = harness();
        let call_id = connect_outgoing(&h, CallType::Audio).await;

        assert_eq!(h.transport.answers_applied.load(Ordering::SeqCst), 1);
        assert_eq!(h.coordinator.current_call_id().await, Some(call_id));
    }

    #[tokio::test]
    async fn unappliable_answer_fails_the_call() {
        let h = harness();
        h.transport.fail_apply_answer.store(true, Ordering::SeqCst);

        let call_id = h.coordinator.start_call("peer-1", CallType::Audio).await.unwrap();
        h.coordinator
            .handle_signal(SignalMessage {
                call_id,
                from: "peer-1".to_string(),
                payload: SignalPayload::Answer { sdp: "v=0".to_string() },
            })
            .await;

        assert_eq!(h.coordinator.current_state().await, CallState::Failed);
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
        assert_eq!(h.coordinator.stats().await.failed_calls, 1);
    }

    #[tokio::test]
    async fn controls_require_an_active_session() {
        let h = harness();
        assert_err!(h.coordinator.toggle_mute().await);
        assert_err!(h.coordinator.toggle_camera().await);
        assert_err!(h.coordinator.toggle_speaker().await);
        assert_err!(h.coordinator.enable_screen_sharing().await);
    }

    #[tokio::test]
    async fn transport_failure_fails_the_connected_call() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;

        h.coordinator.handle_transport_failure("relay lost").await;

        assert_eq!(h.coordinator.current_state().await, CallState::Failed);
        assert_eq!(h.capture.released.load(Ordering::SeqCst), 1);
        let stats = h.coordinator.stats().await;
        assert_eq!(stats.failed_calls, 1);
    }

    #[tokio::test]
    async fn new_call_during_grace_window_succeeds() {
        let h = harness();
        connect_outgoing(&h, CallType::Audio).await;
        h.coordinator.end_call().await;
        assert_eq!(h.coordinator.current_state().await, CallState::Ended);

        // The lingering terminal session must not report busy.
        let second = h.coordinator.start_call("peer-4", CallType::Audio).await;
        assert_ok!(&second);
        assert_eq!(h.coordinator.current_state().await, CallState::Connecting);
        assert_eq!(h.coordinator.current_call_id().await, second.ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_incoming_call_rings_out() {
        use std::time::Duration;

        let h = harness_with(
            CoordinatorConfig::default()
                .with_ring_timeout(Duration::from_secs(5))
                .with_end_call_grace(Duration::from_secs(1)),
        );
        ring_incoming(&h, CallType::Audio).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        let payloads = h.transport.sent_payloads();
        assert!(payloads.iter().any(|p| matches!(p, SignalPayload::Hangup { .. })));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.coordinator.current_state().await, CallState::Idle);
        assert_eq!(h.coordinator.stats().await.missed_calls, 1);
    }

    #[tokio::test]
    async fn ledger_tracks_direction_and_outcome() {
        let h = harness();
        let call_id = connect_outgoing(&h, CallType::Video).await;
        assert_eq!(
            h.coordinator.get_active_call().await.map(|i| i.call_id),
            Some(call_id)
        );
        assert!(h.coordinator.get_call_history().is_empty());

        h.coordinator.end_call().await;

        let info = h.coordinator.get_call(&call_id).unwrap();
        assert_eq!(info.direction, crate::call::CallDirection::Outgoing);
        assert_eq!(info.state, CallState::Ended);
        assert!(info.connected_at.is_some());
        assert!(info.ended_at.is_some());

        let stats = h.coordinator.stats().await;
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.connected_calls, 1);

        assert_eq!(h.coordinator.list_calls().len(), 1);
        let history = h.coordinator.get_call_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].call_id, call_id);
    }
}

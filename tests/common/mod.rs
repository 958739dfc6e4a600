//! Shared mock collaborators for the integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use studypals_call_core::media::{AudioRouter, MediaCapture, MediaStreamHandle, TrackKind};
use studypals_call_core::signaling::SdpKind;
use studypals_call_core::{
    CallError, CallId, CallResult, CallSessionCoordinator, CallType, CoordinatorConfig,
    SessionDescription, SignalPayload, SignalingTransport, VideoSource,
};

#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(CallId, String, SignalPayload)>>,
    pub fail_send: AtomicBool,
    pub answers_applied: AtomicUsize,
    pub replace_count: AtomicUsize,
    pub close_count: AtomicUsize,
}

impl RecordingTransport {
    pub fn sent_payloads(&self) -> Vec<SignalPayload> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl SignalingTransport for RecordingTransport {
    async fn create_offer(&self, _call_type: CallType) -> CallResult<SessionDescription> {
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
pub struct CountingCapture {
    pub fail_acquire: AtomicBool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub track_enabled: Mutex<HashMap<TrackKind, bool>>,
}

impl CountingCapture {
    pub fn track_is_enabled(&self, kind: TrackKind) -> bool {
        *self.track_enabled.lock().unwrap().get(&kind).unwrap_or(&true)
    }
}

#[async_trait]
impl MediaCapture for CountingCapture {
    async fn acquire(&self, video: bool) -> CallResult<MediaStreamHandle> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(CallError::media_acquisition_failed("device busy"));
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
        Ok(())
    }
}

#[derive(Default)]
pub struct NullRouter;

#[async_trait]
impl AudioRouter for NullRouter {
    async fn set_speakerphone(&self, _on: bool) -> CallResult<()> {
        Ok(())
    }
}

pub struct TestHarness {
    pub coordinator: Arc<CallSessionCoordinator>,
    pub transport: Arc<RecordingTransport>,
    pub capture: Arc<CountingCapture>,
}

pub fn harness(config: CoordinatorConfig) -> TestHarness {
    init_tracing();
    let transport = Arc::new(RecordingTransport::default());
    let capture = Arc::new(CountingCapture::default());
    let coordinator = CallSessionCoordinator::new(
        config,
        transport.clone(),
        capture.clone(),
        Arc::new(NullRouter),
    );
    TestHarness {
        coordinator,
        transport,
        capture,
    }
}

/// Short grace and ring windows so terminal resets land within test time
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .with_end_call_grace(std::time::Duration::from_millis(50))
        .with_ring_timeout(std::time::Duration::from_secs(5))
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

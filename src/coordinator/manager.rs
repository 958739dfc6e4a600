//! The call session coordinator
//!
//! `CallSessionCoordinator` owns the lifecycle of a single peer-to-peer
//! call: state transitions, media-stream plumbing to and from the
//! signaling transport, and the mute/camera/speaker/screen-share toggles.
//! It is the single owner of all session state; every UI entry point
//! (call screen, incoming-call dialog, chat screen) observes it through
//! subscribe-only broadcast channels rather than shared mutable fields.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use studypals_call_core::{CallSessionCoordinator, CoordinatorConfig, CallType};
//! # use studypals_call_core::signaling::SignalingTransport;
//! # use studypals_call_core::media::{MediaCapture, PlatformAudioRouter};
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
//! let mut states = coordinator.subscribe_state_changes();
//! let call_id = coordinator.start_call("peer-7", CallType::Video).await?;
//!
//! while let Ok(change) = states.recv().await {
//!     println!("call {} is now {}", change.call_id, change.new_state);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::call::{
    CallDirection, CallId, CallInfo, CallState, CallStats, CallType, MediaFlags,
};
use crate::error::{CallError, CallResult};
use crate::events::{
    CallEventHandler, CallStateChangeInfo, CoordinatorEvent, MediaBinding, MediaEventInfo,
    MediaEventType,
};
use crate::media::{AudioRouter, MediaCapture, MediaStreamHandle};
use crate::signaling::{SessionDescription, SignalingTransport};

use super::config::CoordinatorConfig;

/// The one active session a coordinator may hold
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub call_id: CallId,
    pub call_type: CallType,
    pub direction: CallDirection,
    pub remote_peer: String,
    pub state: CallState,
    pub flags: MediaFlags,
    /// Exclusively owned; must reach `MediaCapture::release` on every exit path
    pub local_stream: Option<MediaStreamHandle>,
    /// Binding only; contents are never touched
    pub remote_stream: Option<MediaStreamHandle>,
    /// Stored offer for incoming sessions, consumed by `answer_call`
    pub remote_offer: Option<SessionDescription>,
    /// Guards against duplicate `SessionReady` emission
    pub ready_announced: bool,
}

/// Coordinates the lifecycle of a single peer-to-peer audio/video call
///
/// Exactly one session may be active at a time; starting a call while one
/// is active fails with [`CallError::Busy`]. All operations serialize
/// through the session lock, so two overlapping intents can never
/// interleave their transitions.
pub struct CallSessionCoordinator {
    pub(crate) config: CoordinatorConfig,
    pub(crate) transport: Arc<dyn SignalingTransport>,
    pub(crate) media: Arc<dyn MediaCapture>,
    pub(crate) audio_router: Arc<dyn AudioRouter>,

    pub(crate) session: RwLock<Option<ActiveSession>>,
    /// Ledger of all calls this coordinator has handled
    pub(crate) call_info: DashMap<CallId, CallInfo>,
    pub(crate) stats: Mutex<CallStats>,

    pub(crate) event_tx: broadcast::Sender<CoordinatorEvent>,
    pub(crate) state_tx: broadcast::Sender<CallStateChangeInfo>,
    pub(crate) local_media_tx: broadcast::Sender<MediaBinding>,
    pub(crate) remote_media_tx: broadcast::Sender<MediaBinding>,
    pub(crate) event_handler: RwLock<Option<Arc<dyn CallEventHandler>>>,
}

impl CallSessionCoordinator {
    /// Create a coordinator over the given external capabilities
    pub fn new(
        config: CoordinatorConfig,
        transport: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaCapture>,
        audio_router: Arc<dyn AudioRouter>,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (state_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (local_media_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (remote_media_tx, _) = broadcast::channel(config.event_channel_capacity);

        Arc::new(Self {
            config,
            transport,
            media,
            audio_router,
            session: RwLock::new(None),
            call_info: DashMap::new(),
            stats: Mutex::new(CallStats::default()),
            event_tx,
            state_tx,
            local_media_tx,
            remote_media_tx,
            event_handler: RwLock::new(None),
        })
    }

    // ===== SUBSCRIPTIONS =====

    /// Subscribe to the unified event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to call state changes
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<CallStateChangeInfo> {
        self.state_tx.subscribe()
    }

    /// Subscribe to local media stream bindings
    pub fn subscribe_local_media(&self) -> broadcast::Receiver<MediaBinding> {
        self.local_media_tx.subscribe()
    }

    /// Subscribe to remote media stream bindings
    pub fn subscribe_remote_media(&self) -> broadcast::Receiver<MediaBinding> {
        self.remote_media_tx.subscribe()
    }

    /// Register a push-style event handler
    ///
    /// The handler runs on its own task per event and may call back into
    /// the coordinator.
    pub async fn set_event_handler(&self, handler: Arc<dyn CallEventHandler>) {
        *self.event_handler.write().await = Some(handler);
    }

    // ===== READ-ONLY ACCESSORS =====

    /// Id of the active call, if any
    ///
    /// Used by views to reconstruct UI state after a navigation event.
    pub async fn current_call_id(&self) -> Option<CallId> {
        self.session.read().await.as_ref().map(|s| s.call_id)
    }

    /// Type of the active call, if any
    pub async fn current_call_type(&self) -> Option<CallType> {
        self.session.read().await.as_ref().map(|s| s.call_type)
    }

    /// State of the active session, `Idle` when there is none
    pub async fn current_state(&self) -> CallState {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(CallState::Idle)
    }

    /// Media flags of the active session, if any
    pub async fn current_flags(&self) -> Option<MediaFlags> {
        self.session.read().await.as_ref().map(|s| s.flags)
    }

    /// Ledger entry for a specific call
    pub fn get_call(&self, call_id: &CallId) -> CallResult<CallInfo> {
        self.call_info
            .get(call_id)
            .map(|entry| entry.value().clone())
            .ok_or(CallError::CallNotFound { call_id: *call_id })
    }

    /// All calls this coordinator has handled, active and historical
    pub fn list_calls(&self) -> Vec<CallInfo> {
        self.call_info.iter().map(|e| e.value().clone()).collect()
    }

    /// Ledger entry for the active call, if any
    pub async fn get_active_call(&self) -> Option<CallInfo> {
        let call_id = self.current_call_id().await?;
        self.call_info.get(&call_id).map(|e| e.value().clone())
    }

    /// Finished calls only
    pub fn get_call_history(&self) -> Vec<CallInfo> {
        self.call_info
            .iter()
            .filter(|e| e.value().state.is_terminal())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Aggregate counters over the call ledger
    pub async fn stats(&self) -> CallStats {
        self.stats.lock().await.clone()
    }

    // ===== INTERNAL EMISSION HELPERS =====

    /// Broadcast an event and dispatch it to the registered handler
    pub(crate) async fn emit_event(&self, event: CoordinatorEvent) {
        let _ = self.event_tx.send(event.clone());
        if let Some(handler) = self.event_handler.read().await.as_ref() {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler.on_event(event).await;
            });
        }
    }

    /// Move the session to `next`, sync the ledger, and notify observers
    pub(crate) async fn transition(
        &self,
        session: &mut ActiveSession,
        next: CallState,
        reason: Option<String>,
    ) {
        debug_assert!(
            session.state.can_transition_to(next),
            "illegal transition {} -> {}",
            session.state,
            next
        );
        let previous = session.state;
        session.state = next;

        if let Some(mut info) = self.call_info.get_mut(&session.call_id) {
            info.state = next;
            info.flags = session.flags;
            match next {
                CallState::Connected => info.connected_at = Some(Utc::now()),
                CallState::Ended | CallState::Failed => info.ended_at = Some(Utc::now()),
                _ => {}
            }
        }

        let info = CallStateChangeInfo {
            call_id: session.call_id,
            new_state: next,
            previous_state: previous,
            direction: session.direction,
            reason,
            timestamp: Utc::now(),
        };
        let _ = self.state_tx.send(info.clone());
        self.emit_event(CoordinatorEvent::CallStateChanged { info }).await;

        tracing::info!("Call {} transitioned {} -> {}", session.call_id, previous, next);
    }

    /// Notify observers that the session reset to `Idle`
    pub(crate) async fn emit_idle_reset(
        &self,
        call_id: CallId,
        previous: CallState,
        direction: CallDirection,
        reason: Option<String>,
    ) {
        let info = CallStateChangeInfo {
            call_id,
            new_state: CallState::Idle,
            previous_state: previous,
            direction,
            reason,
            timestamp: Utc::now(),
        };
        let _ = self.state_tx.send(info.clone());
        self.emit_event(CoordinatorEvent::CallStateChanged { info }).await;
        tracing::debug!("Call {} session reset to idle", call_id);
    }

    /// Publish the current local stream binding
    pub(crate) async fn emit_local_binding(
        &self,
        call_id: CallId,
        stream: Option<MediaStreamHandle>,
    ) {
        let binding = MediaBinding {
            call_id,
            stream,
            timestamp: Utc::now(),
        };
        let _ = self.local_media_tx.send(binding.clone());
        self.emit_event(CoordinatorEvent::LocalStreamChanged { binding }).await;
    }

    /// Publish the current remote stream binding
    pub(crate) async fn emit_remote_binding(
        &self,
        call_id: CallId,
        stream: Option<MediaStreamHandle>,
    ) {
        let binding = MediaBinding {
            call_id,
            stream,
            timestamp: Utc::now(),
        };
        let _ = self.remote_media_tx.send(binding.clone());
        self.emit_event(CoordinatorEvent::RemoteStreamChanged { binding }).await;
    }

    /// Publish a media flag change
    pub(crate) async fn emit_media_event(&self, call_id: CallId, event_type: MediaEventType) {
        let info = MediaEventInfo {
            call_id,
            event_type,
            timestamp: Utc::now(),
        };
        self.emit_event(CoordinatorEvent::MediaEvent { info }).await;
    }

    /// Announce `SessionReady` once the session is connected with both
    /// stream bindings stable
    pub(crate) async fn maybe_announce_ready(&self, session: &mut ActiveSession) {
        if session.ready_announced || !session.state.is_active() {
            return;
        }
        let local_ready = session.local_stream.is_some();
        // Audio-only remote media still arrives as a stream binding
        let remote_ready = session.remote_stream.is_some();
        if local_ready && remote_ready {
            session.ready_announced = true;
            self.emit_event(CoordinatorEvent::SessionReady {
                call_id: session.call_id,
            })
            .await;
            tracing::info!("Call {} session ready", session.call_id);
        }
    }

    /// End any active call and release media hardware
    ///
    /// Safe to call repeatedly; intended for app-level teardown so camera
    /// and microphone locks never outlive the owning context.
    pub async fn shutdown(self: &Arc<Self>) {
        self.end_call().await;
        tracing::info!("Coordinator shut down");
    }
}

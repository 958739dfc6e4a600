//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable policies for a [`CallSessionCoordinator`](super::CallSessionCoordinator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long a call may stay in `Ringing` (or an outgoing call may wait
    /// for an answer) before it is terminated as unanswered
    pub ring_timeout: Duration,
    /// How long a terminal state is shown before the session resets to
    /// `Idle`, giving observers time to render a "call ended" UI
    pub end_call_grace: Duration,
    /// Capacity of each broadcast channel; slow subscribers lag, they are
    /// never waited for
    pub event_channel_capacity: usize,
    /// Whether new sessions start on speakerphone
    pub speaker_on_by_default: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(60),
            end_call_grace: Duration::from_millis(1500),
            event_channel_capacity: 64,
            speaker_on_by_default: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring timeout
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Set the grace period between a terminal state and the reset to `Idle`
    pub fn with_end_call_grace(mut self, grace: Duration) -> Self {
        self.end_call_grace = grace;
        self
    }

    /// Set the broadcast channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set whether new sessions start on speakerphone
    pub fn with_speaker_on_by_default(mut self, on: bool) -> Self {
        self.speaker_on_by_default = on;
        self
    }
}

// src/connection/tracker.rs
//! Debounced tri-state liveness tracking for one sensor stream
//!
//! The tracker decides "is this device live right now" from two ages: time
//! since the last heartbeat and time since the last sample. Promotion needs
//! only one fresh signal; demotion needs both to be clearly stale. The gap
//! between the two sets of bounds plus the dwell guard keeps the indicator
//! from flapping on a jittery transport.

use crate::config::TrackerConfig;
use crate::connection::DebounceGuard;
use crate::types::{ConnectionState, HeartbeatRecord, SensorKind, StateChange};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ConnectionStateTracker {
    stream: SensorKind,
    config: TrackerConfig,
    state: ConnectionState,
    debounce: DebounceGuard,
    ever_connected: bool,
    heartbeat: Option<HeartbeatRecord>,
    last_sample_at: Option<u64>,
}

impl ConnectionStateTracker {
    pub fn new(stream: SensorKind, config: TrackerConfig) -> Self {
        Self {
            stream,
            config,
            state: ConnectionState::Disconnected,
            debounce: DebounceGuard::new(config.dwell_ms),
            ever_connected: false,
            heartbeat: None,
            last_sample_at: None,
        }
    }

    pub fn stream(&self) -> SensorKind {
        self.stream
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_transition_at(&self) -> Option<u64> {
        self.debounce.last_transition_at()
    }

    pub fn heartbeat(&self) -> Option<HeartbeatRecord> {
        self.heartbeat
    }

    /// Note that a valid message arrived; older timestamps are ignored
    pub fn record_heartbeat(&mut self, seen_at: u64) -> bool {
        match self.heartbeat.as_mut() {
            Some(record) => record.observe(seen_at),
            None => {
                self.heartbeat = Some(HeartbeatRecord::new(self.stream, seen_at));
                true
            }
        }
    }

    /// Note that a data sample arrived; a sample is also a heartbeat
    pub fn record_sample(&mut self, received_at: u64) {
        if self.last_sample_at.map_or(true, |last| received_at > last) {
            self.last_sample_at = Some(received_at);
        }
        self.record_heartbeat(received_at);
    }

    pub fn heartbeat_age(&self, now_ms: u64) -> Option<u64> {
        self.heartbeat.map(|hb| hb.age(now_ms))
    }

    pub fn sample_age(&self, now_ms: u64) -> Option<u64> {
        self.last_sample_at.map(|at| now_ms.saturating_sub(at))
    }

    /// Either signal is fresh
    pub fn should_be_connected(&self, now_ms: u64) -> bool {
        let heartbeat_fresh = self
            .heartbeat_age(now_ms)
            .map_or(false, |age| age < self.config.heartbeat_timeout_ms);
        let sample_fresh = self
            .sample_age(now_ms)
            .map_or(false, |age| age < self.config.recent_data_ms);
        heartbeat_fresh || sample_fresh
    }

    /// Both signals are clearly stale; a missing signal counts as infinitely old
    fn clearly_stale(&self, now_ms: u64) -> bool {
        let heartbeat_stale = self
            .heartbeat_age(now_ms)
            .map_or(true, |age| age > self.config.heartbeat_stale_ms);
        let sample_stale = self
            .sample_age(now_ms)
            .map_or(true, |age| age > self.config.sample_stale_ms);
        heartbeat_stale && sample_stale
    }

    /// Re-evaluate liveness at `now_ms`, returning the transition if one happened
    pub fn evaluate(&mut self, now_ms: u64) -> Option<StateChange> {
        let should = self.should_be_connected(now_ms);
        let dwell_ok = self.debounce.dwell_satisfied(now_ms);

        match self.state {
            ConnectionState::Connected => {
                if !should && self.clearly_stale(now_ms) && dwell_ok {
                    return Some(self.transition(ConnectionState::Disconnected, now_ms));
                }
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                if should && (dwell_ok || !self.ever_connected) {
                    return Some(self.transition(ConnectionState::Connected, now_ms));
                }
                if self.state == ConnectionState::Connecting
                    && !should
                    && self.clearly_stale(now_ms)
                    && dwell_ok
                {
                    return Some(self.transition(ConnectionState::Disconnected, now_ms));
                }
            }
        }

        if !dwell_ok && should != (self.state == ConnectionState::Connected) {
            debug!(
                stream = %self.stream,
                state = %self.state,
                remaining_ms = self.debounce.remaining(now_ms),
                "Holding state within dwell window"
            );
        }
        None
    }

    /// A transport attempt began; only moves `Disconnected -> Connecting`
    pub fn mark_connecting(&mut self, now_ms: u64) -> Option<StateChange> {
        if self.state == ConnectionState::Disconnected && self.debounce.dwell_satisfied(now_ms) {
            Some(self.transition(ConnectionState::Connecting, now_ms))
        } else {
            None
        }
    }

    /// Demote immediately, bypassing the dwell guard
    pub fn force_disconnected(&mut self, now_ms: u64) -> Option<StateChange> {
        if self.state == ConnectionState::Disconnected {
            return None;
        }
        warn!(stream = %self.stream, "Forcing stream down after repeated transport failures");
        Some(self.transition(ConnectionState::Disconnected, now_ms))
    }

    /// Discard all session-scoped liveness state
    pub fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.debounce.reset();
        self.ever_connected = false;
        self.heartbeat = None;
        self.last_sample_at = None;
    }

    fn transition(&mut self, to: ConnectionState, now_ms: u64) -> StateChange {
        let change = StateChange {
            stream: self.stream,
            from: self.state,
            to,
            at: now_ms,
        };
        self.state = to;
        self.debounce.record(now_ms);
        if to == ConnectionState::Connected {
            self.ever_connected = true;
        }
        info!(stream = %self.stream, from = %change.from, to = %change.to, "Connection state changed");
        change
    }
}

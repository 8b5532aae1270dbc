// src/session.rs
//! Per-stream session state
//!
//! A session owns everything one sensor stream accumulates while the operator
//! is watching it: the liveness tracker, the signal processor and the
//! sample/marker lists. Acquisition tasks only hold the session's `active`
//! flag; once it is cleared nothing they deliver is applied.

use crate::config::TelemetryConfig;
use crate::connection::ConnectionStateTracker;
use crate::error::{TelemetryError, TelemetryResult};
use crate::processing::annotation::annotate;
use crate::processing::calibration::{CalibrationOutcome, CalibrationRange};
use crate::processing::muscle::MuscleProcessor;
use crate::processing::stats::{
    baseline_from_stats, detect_thermal_event, is_stable_frame, muscle_stats, thermal_stats, MuscleStats,
    ThermalStats,
};
use crate::processing::thermal::{DisplayFrame, ThermalProcessor};
use crate::transport::types::{parse_muscle_payload, parse_thermal_payload, StreamEvent};
use crate::types::{
    ConnectionState, MarkerKind, MoveMarker, MovementPeriod, ProcessedSample, SensorKind, StateChange,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Frame statistics kept for the rolling stats baseline
const STATS_HISTORY: usize = crate::config::constants::thermal::BASELINE_STATS_WINDOW;

/// Lifecycle and event handling shared by both stream sessions
pub trait StreamSession: Send {
    /// What a successfully ingested payload yields
    type Output;

    fn stream(&self) -> SensorKind;
    fn active_flag(&self) -> &Arc<AtomicBool>;
    fn tracker(&self) -> &ConnectionStateTracker;
    fn tracker_mut(&mut self) -> &mut ConnectionStateTracker;

    /// Parse and apply one raw payload received at local time `received_at`
    fn ingest_payload(&mut self, body: &str, received_at: u64) -> TelemetryResult<Self::Output>;

    /// Drop accumulated data, keeping the active flag
    fn clear(&mut self);

    fn is_active(&self) -> bool {
        self.active_flag().load(Ordering::Acquire)
    }

    fn start(&mut self) {
        self.active_flag().store(true, Ordering::Release);
        info!(stream = %self.stream(), "Session started");
    }

    fn stop(&mut self) {
        self.active_flag().store(false, Ordering::Release);
        info!(stream = %self.stream(), "Session stopped");
    }

    /// Start over: data, calibration and liveness state are discarded
    fn reset(&mut self) {
        self.clear();
        self.tracker_mut().reset();
        debug!(stream = %self.stream(), "Session reset");
    }

    fn state(&self) -> ConnectionState {
        self.tracker().state()
    }

    /// Periodic liveness evaluation
    fn evaluate(&mut self, now_ms: u64) -> Option<StateChange> {
        if !self.is_active() {
            return None;
        }
        self.tracker_mut().evaluate(now_ms)
    }

    /// Apply a non-payload transport event to the tracker
    fn handle_event(&mut self, event: &StreamEvent, now_ms: u64) -> Option<StateChange> {
        if !self.is_active() || event.stream() != self.stream() {
            return None;
        }
        match event {
            StreamEvent::ModeChanged { mode, .. } => {
                debug!(stream = %self.stream(), mode = %mode, "Transport attempt started");
                self.tracker_mut().mark_connecting(now_ms)
            }
            StreamEvent::FailureLimit { failures, cooldown_ms, .. } => {
                let error = TelemetryError::ConsecutiveFailureLimit {
                    stream: self.stream(),
                    failures: *failures,
                    cooldown_ms: *cooldown_ms,
                    context: crate::error_context!("session", "handle_event"),
                };
                warn!(error = %error, "Stream suspended");
                self.tracker_mut().force_disconnected(now_ms)
            }
            StreamEvent::TransportFailed { error, consecutive, mode, .. } => {
                debug!(stream = %self.stream(), mode = %mode, consecutive, error = %error, "Transport failure");
                None
            }
            StreamEvent::CooldownElapsed { .. } => {
                info!(stream = %self.stream(), "Polling resumed after cooldown");
                None
            }
            StreamEvent::Payload { .. } => None,
        }
    }
}

/// Bounded memory of timestamps already applied, so a snapshot that repeats
/// earlier readings is not ingested twice
#[derive(Debug, Clone)]
struct SeenTimestamps {
    capacity: usize,
    order: VecDeque<u64>,
    seen: HashSet<u64>,
}

impl SeenTimestamps {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// `false` if the timestamp was already recorded
    fn insert(&mut self, timestamp: u64) -> bool {
        if !self.seen.insert(timestamp) {
            return false;
        }
        self.order.push_back(timestamp);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

/// Summary of one ingested muscle payload
#[derive(Debug, Clone, Default)]
pub struct MuscleIngest {
    pub accepted: usize,
    pub duplicates: usize,
    /// Readings that failed validation inside an otherwise valid payload
    pub dropped: usize,
    /// Sensed markers added by this payload
    pub moves: usize,
    /// Set when this payload closed a calibration window
    pub calibration: Option<CalibrationOutcome>,
}

pub struct MuscleSession {
    active: Arc<AtomicBool>,
    tracker: ConnectionStateTracker,
    processor: MuscleProcessor,
    adc_max: u16,
    max_samples: usize,
    samples: Vec<ProcessedSample>,
    markers: Vec<MoveMarker>,
    seen: SeenTimestamps,
    parse_errors: u64,
}

impl MuscleSession {
    pub fn new(config: &TelemetryConfig) -> Self {
        let max_samples = config.muscle.max_session_samples.max(1);
        Self {
            active: Arc::new(AtomicBool::new(false)),
            tracker: ConnectionStateTracker::new(
                SensorKind::Muscle,
                config.connection.tracker_config(SensorKind::Muscle),
            ),
            processor: MuscleProcessor::new(config.muscle.clone()),
            adc_max: config.muscle.adc_max,
            max_samples,
            samples: Vec::new(),
            markers: Vec::new(),
            seen: SeenTimestamps::new(max_samples),
            parse_errors: 0,
        }
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> &[ProcessedSample] {
        &self.samples
    }

    pub fn markers(&self) -> &[MoveMarker] {
        &self.markers
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    /// Operator asked the patient to move
    pub fn mark_request(&mut self, timestamp: u64) {
        self.push_marker(MoveMarker::request(timestamp));
    }

    /// Operator ended the movement
    pub fn mark_end(&mut self, timestamp: u64) {
        self.push_marker(MoveMarker::end(timestamp));
    }

    pub fn periods(&self) -> Vec<MovementPeriod> {
        annotate(&self.markers, &self.samples)
    }

    pub fn stats(&self) -> MuscleStats {
        muscle_stats(&self.samples)
    }

    pub fn start_calibration(&mut self, now_ms: u64) {
        self.processor.start_calibration(now_ms);
    }

    pub fn is_calibrating(&self) -> bool {
        self.processor.is_calibrating()
    }

    pub fn stop_calibration(&mut self) -> Option<CalibrationOutcome> {
        self.processor.stop_calibration()
    }

    /// Close the calibration window once it has run its length
    pub fn poll_calibration(&mut self, now_ms: u64) -> Option<CalibrationOutcome> {
        self.processor.poll_calibration(now_ms)
    }

    pub fn calibration(&self) -> Option<CalibrationRange> {
        self.processor.calibration()
    }

    /// Restore a stored range, e.g. from a previous session
    pub fn set_calibration(&mut self, range: CalibrationRange) -> bool {
        self.processor.set_calibration(range)
    }

    fn push_marker(&mut self, marker: MoveMarker) {
        self.markers.push(marker);
        if self.markers.len() > self.max_samples {
            let excess = self.markers.len() - self.max_samples;
            self.markers.drain(..excess);
        }
    }

    fn push_sample(&mut self, sample: ProcessedSample) {
        self.samples.push(sample);
        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }
}

impl StreamSession for MuscleSession {
    type Output = MuscleIngest;

    fn stream(&self) -> SensorKind {
        SensorKind::Muscle
    }

    fn active_flag(&self) -> &Arc<AtomicBool> {
        &self.active
    }

    fn tracker(&self) -> &ConnectionStateTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ConnectionStateTracker {
        &mut self.tracker
    }

    fn ingest_payload(&mut self, body: &str, received_at: u64) -> TelemetryResult<MuscleIngest> {
        if !self.is_active() {
            return Ok(MuscleIngest::default());
        }

        let message = match parse_muscle_payload(body, self.adc_max) {
            Ok(message) => message,
            Err(reason) => {
                self.parse_errors += 1;
                let error = TelemetryError::parse(
                    SensorKind::Muscle,
                    reason,
                    crate::error_context!("muscle_session", "ingest_payload"),
                );
                warn!(error = %error, parse_errors = self.parse_errors, "Dropping muscle payload");
                return Err(error);
            }
        };

        let mut report = MuscleIngest {
            dropped: message.dropped,
            ..MuscleIngest::default()
        };

        for raw in message.samples {
            if !self.seen.insert(raw.timestamp) {
                report.duplicates += 1;
                continue;
            }
            let reading = self.processor.ingest(raw, received_at);
            if reading.moved {
                self.push_marker(MoveMarker::sensed(raw.timestamp));
                report.moves += 1;
            }
            self.push_sample(reading.sample);
            report.accepted += 1;
        }

        if report.accepted > 0 {
            self.tracker.record_sample(received_at);
        }
        match (message.from_relay, message.heartbeat_at) {
            // The relay reports when it last heard from the device
            (true, Some(at)) => {
                self.tracker.record_heartbeat(at.min(received_at));
            }
            (true, None) => {}
            (false, _) => {
                self.tracker.record_heartbeat(received_at);
            }
        }

        if report.dropped > 0 {
            debug!(dropped = report.dropped, "Invalid readings skipped in muscle snapshot");
        }

        report.calibration = self.processor.poll_calibration(received_at);
        Ok(report)
    }

    fn clear(&mut self) {
        self.samples = Vec::new();
        self.markers = Vec::new();
        self.seen.clear();
        self.processor.reset();
        self.parse_errors = 0;
    }
}

/// Latest thermal output plus the rolling frame statistics
pub struct ThermalSession {
    active: Arc<AtomicBool>,
    tracker: ConnectionStateTracker,
    processor: ThermalProcessor,
    grid: (usize, usize),
    latest: Option<DisplayFrame>,
    stats: VecDeque<ThermalStats>,
    seen: SeenTimestamps,
    sensor_model: Option<String>,
    parse_errors: u64,
}

impl ThermalSession {
    pub fn new(config: &TelemetryConfig) -> Self {
        let processor = ThermalProcessor::new(config.thermal.clone(), config.display.clone());
        Self {
            active: Arc::new(AtomicBool::new(false)),
            tracker: ConnectionStateTracker::new(
                SensorKind::Thermal,
                config.connection.tracker_config(SensorKind::Thermal),
            ),
            grid: processor.grid(),
            processor,
            latest: None,
            stats: VecDeque::with_capacity(STATS_HISTORY),
            seen: SeenTimestamps::new(STATS_HISTORY),
            sensor_model: None,
            parse_errors: 0,
        }
    }

    pub fn latest(&self) -> Option<&DisplayFrame> {
        self.latest.as_ref()
    }

    pub fn sensor_model(&self) -> Option<&str> {
        self.sensor_model.as_deref()
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }

    pub fn latest_stats(&self) -> Option<ThermalStats> {
        self.stats.back().copied()
    }

    /// Mean frame temperature over the recent window, once it is full
    pub fn stats_baseline(&self) -> Option<f32> {
        let history: Vec<ThermalStats> = self.stats.iter().copied().collect();
        baseline_from_stats(&history)
    }

    pub fn is_stable(&self) -> bool {
        self.latest_stats()
            .map_or(false, |stats| is_stable_frame(&stats, self.stats_baseline()))
    }

    /// The latest frame departs noticeably from the recent baseline
    pub fn thermal_event(&self) -> bool {
        self.latest_stats()
            .map_or(false, |stats| detect_thermal_event(stats.average, self.stats_baseline()))
    }

    pub fn start_calibration(&mut self) {
        self.processor.start_baseline_capture();
        info!("Thermal baseline capture started");
    }

    pub fn is_calibrating(&self) -> bool {
        self.processor.is_calibrating()
    }

    /// Operator stop; `true` if a baseline was installed
    pub fn stop_calibration(&mut self) -> bool {
        self.processor.stop_baseline_capture()
    }

    fn push_stats(&mut self, stats: ThermalStats) {
        if self.stats.len() == STATS_HISTORY {
            self.stats.pop_front();
        }
        self.stats.push_back(stats);
    }
}

impl StreamSession for ThermalSession {
    /// A display frame, or `None` for heartbeats, repeats and empty responses
    type Output = Option<DisplayFrame>;

    fn stream(&self) -> SensorKind {
        SensorKind::Thermal
    }

    fn active_flag(&self) -> &Arc<AtomicBool> {
        &self.active
    }

    fn tracker(&self) -> &ConnectionStateTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ConnectionStateTracker {
        &mut self.tracker
    }

    fn ingest_payload(&mut self, body: &str, received_at: u64) -> TelemetryResult<Option<DisplayFrame>> {
        if !self.is_active() {
            return Ok(None);
        }

        let message = match parse_thermal_payload(body, self.grid) {
            Ok(message) => message,
            Err(reason) => {
                self.parse_errors += 1;
                let error = TelemetryError::parse(
                    SensorKind::Thermal,
                    reason,
                    crate::error_context!("thermal_session", "ingest_payload"),
                );
                warn!(error = %error, parse_errors = self.parse_errors, "Dropping thermal payload");
                return Err(error);
            }
        };

        if message.is_heartbeat {
            self.tracker.record_heartbeat(received_at);
            return Ok(None);
        }
        // The relay reports when it last heard from the sensor
        if let Some(at) = message.relay_updated_at {
            self.tracker.record_heartbeat(at.min(received_at));
        }
        let Some(frame) = message.frame else {
            return Ok(None);
        };
        if let Some(timestamp) = message.timestamp {
            if !self.seen.insert(timestamp) {
                return Ok(None);
            }
        }

        if message.sensor_model.is_some() && message.sensor_model != self.sensor_model {
            info!(model = ?message.sensor_model, "Thermal sensor identified");
            self.sensor_model = message.sensor_model;
        }

        self.tracker.record_sample(received_at);
        self.push_stats(thermal_stats(&frame));

        let display = self
            .processor
            .process(&frame, message.timestamp.unwrap_or(received_at));
        self.latest = Some(display.clone());
        Ok(Some(display))
    }

    fn clear(&mut self) {
        self.processor.reset();
        self.latest = None;
        self.stats = VecDeque::with_capacity(STATS_HISTORY);
        self.seen.clear();
        self.parse_errors = 0;
    }
}

/// Markers of one kind, in insertion order
pub fn markers_of(markers: &[MoveMarker], kind: MarkerKind) -> impl Iterator<Item = &MoveMarker> {
    markers.iter().filter(move |m| m.kind == kind)
}

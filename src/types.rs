// src/types.rs
//! Core telemetry types shared by the transport, connection and processing layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two independent sensor streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Muscle-activity (EMG) sensor
    Muscle,
    /// 8x8 thermal-array sensor
    Thermal,
}

impl SensorKind {
    pub const ALL: [SensorKind; 2] = [SensorKind::Muscle, SensorKind::Thermal];

    pub fn as_str(self) -> &'static str {
        match self {
            SensorKind::Muscle => "muscle",
            SensorKind::Thermal => "thermal",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state liveness judgment for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// A genuine connection-state transition, published once per change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub stream: SensorKind,
    pub from: ConnectionState,
    pub to: ConnectionState,
    /// Epoch milliseconds of the transition
    pub at: u64,
}

/// Last time any valid message arrived on a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub last_seen_at: u64,
    pub source: SensorKind,
}

impl HeartbeatRecord {
    pub fn new(source: SensorKind, seen_at: u64) -> Self {
        Self {
            last_seen_at: seen_at,
            source,
        }
    }

    /// Move the record forward; older timestamps are ignored
    pub fn observe(&mut self, seen_at: u64) -> bool {
        if seen_at > self.last_seen_at {
            self.last_seen_at = seen_at;
            true
        } else {
            false
        }
    }

    pub fn age(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_at)
    }
}

/// One raw muscle reading as received
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Epoch milliseconds
    pub timestamp: u64,
    /// ADC value, 0..=4095
    pub raw_value: u16,
    /// Voltage reported by the device, if any
    pub voltage: Option<f32>,
}

/// A raw sample after voltage derivation and calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub raw: RawSample,
    /// Reported voltage, or derived from the raw value
    pub voltage: f32,
    /// Calibrated activation, 0..=100
    pub activation_percent: f32,
}

impl ProcessedSample {
    pub fn timestamp(&self) -> u64 {
        self.raw.timestamp
    }
}

/// Marker kinds on the muscle timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Operator asked the patient to move
    Request,
    /// Movement detected from the signal
    Sensed,
    /// Operator ended the movement
    End,
}

impl MarkerKind {
    /// Request and sensed markers open a movement period
    pub fn opens_period(self) -> bool {
        matches!(self, MarkerKind::Request | MarkerKind::Sensed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveMarker {
    pub timestamp: u64,
    pub kind: MarkerKind,
}

impl MoveMarker {
    pub fn new(timestamp: u64, kind: MarkerKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn request(timestamp: u64) -> Self {
        Self::new(timestamp, MarkerKind::Request)
    }

    pub fn sensed(timestamp: u64) -> Self {
        Self::new(timestamp, MarkerKind::Sensed)
    }

    pub fn end(timestamp: u64) -> Self {
        Self::new(timestamp, MarkerKind::End)
    }
}

/// A bounded movement with the strongest sample inside it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovementPeriod {
    pub start: MoveMarker,
    pub end: MoveMarker,
    pub peak: ProcessedSample,
}

impl MovementPeriod {
    pub fn duration_ms(&self) -> u64 {
        self.end.timestamp.saturating_sub(self.start.timestamp)
    }
}

/// Which transport delivered a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Persistent push channel
    Push,
    /// Fixed-interval pull polling
    Pull,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Push => write!(f, "push"),
            TransportMode::Pull => write!(f, "pull"),
        }
    }
}

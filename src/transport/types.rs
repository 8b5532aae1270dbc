// src/transport/types.rs
//! Wire payloads and the events an acquisition loop emits

use crate::error::TransportError;
use crate::types::{RawSample, SensorKind, TransportMode};
use ndarray::Array2;
use serde::Deserialize;
use serde_json::Value;

/// One muscle reading as the sensor or relay sends it.
/// An envelope carrying only a timestamp is a heartbeat.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MuscleEnvelope {
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub muscle_activity: Option<f64>,
    #[serde(default)]
    pub muscle_activity_processed: Option<f64>,
    #[serde(default)]
    pub voltage: Option<f64>,
}

/// Relay liveness report with the latest readings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySnapshot {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub data: Vec<MuscleEnvelope>,
    #[serde(default)]
    pub is_connected: Option<bool>,
    #[serde(default)]
    pub data_count: Option<u64>,
    #[serde(default)]
    pub last_heartbeat: Option<f64>,
    #[serde(default)]
    pub time_since_last_heartbeat: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MuscleWire {
    Snapshot(RelaySnapshot),
    Envelope(MuscleEnvelope),
}

/// A decoded muscle message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MuscleMessage {
    /// Samples in arrival order
    pub samples: Vec<RawSample>,
    /// Heartbeat reported by the sender (relay `lastHeartbeat` or an envelope timestamp)
    pub heartbeat_at: Option<u64>,
    /// Samples that failed validation and were dropped
    pub dropped: usize,
    /// Came from a relay snapshot; `heartbeat_at` then speaks for the device
    pub from_relay: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

/// Thermal push packet or pull response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermalWire {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(rename = "thermal_data", alias = "data", default)]
    thermal_data: Option<Vec<Vec<f32>>>,
    #[serde(rename = "sensor_info", default)]
    sensor_info: Option<Value>,
    #[serde(rename = "grid_size", default)]
    grid_size: Option<GridSize>,
    #[serde(default)]
    last_update_time: Option<f64>,
}

/// A decoded thermal message
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalMessage {
    /// Absent for connection notices and empty relay responses
    pub frame: Option<Array2<f32>>,
    /// A frameless message that still proves the sender is alive
    pub is_heartbeat: bool,
    pub timestamp: Option<u64>,
    /// Sensor model, when reported
    pub sensor_model: Option<String>,
    /// Relay-reported time of its last update
    pub relay_updated_at: Option<u64>,
}

/// Accepts epoch milliseconds as a JSON number or a numeric string
fn timestamp_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn finite_millis(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value as u64)
}

impl MuscleEnvelope {
    /// Convert into a raw sample; `Ok(None)` for heartbeat-only envelopes
    pub fn into_sample(self, adc_max: u16) -> Result<Option<RawSample>, String> {
        let timestamp = self.timestamp.as_ref().and_then(timestamp_from_value);
        let Some(raw) = self.muscle_activity else {
            return match timestamp {
                Some(_) => Ok(None),
                None => Err("envelope has neither a reading nor a timestamp".to_string()),
            };
        };
        let timestamp = timestamp.ok_or_else(|| "reading without a timestamp".to_string())?;

        if !raw.is_finite() || raw < 0.0 || raw > adc_max as f64 {
            return Err(format!("raw value {} outside 0..={}", raw, adc_max));
        }

        let voltage = self.voltage.filter(|v| v.is_finite()).map(|v| v as f32);

        Ok(Some(RawSample {
            timestamp,
            raw_value: raw.round() as u16,
            voltage,
        }))
    }
}

/// Decode a muscle payload: either a single envelope or a relay snapshot
pub fn parse_muscle_payload(body: &str, adc_max: u16) -> Result<MuscleMessage, String> {
    let wire: MuscleWire = serde_json::from_str(body).map_err(|e| e.to_string())?;

    match wire {
        MuscleWire::Envelope(envelope) => {
            let heartbeat_at = envelope.timestamp.as_ref().and_then(timestamp_from_value);
            let sample = envelope.into_sample(adc_max)?;
            Ok(MuscleMessage {
                samples: sample.into_iter().collect(),
                heartbeat_at,
                dropped: 0,
                from_relay: false,
            })
        }
        MuscleWire::Snapshot(snapshot) => {
            let mut message = MuscleMessage {
                heartbeat_at: snapshot.last_heartbeat.and_then(finite_millis).filter(|at| *at > 0),
                from_relay: true,
                ..MuscleMessage::default()
            };
            for envelope in snapshot.data {
                match envelope.into_sample(adc_max) {
                    Ok(Some(sample)) => message.samples.push(sample),
                    Ok(None) => {}
                    Err(_) => message.dropped += 1,
                }
            }
            Ok(message)
        }
    }
}

/// Decode a thermal payload, checking the grid against the expected shape
pub fn parse_thermal_payload(
    body: &str,
    expected: (usize, usize),
) -> Result<ThermalMessage, String> {
    let wire: ThermalWire = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let (width, height) = expected;

    if let Some(grid) = &wire.grid_size {
        if grid.width != width || grid.height != height {
            return Err(format!(
                "grid {}x{} does not match expected {}x{}",
                grid.width, grid.height, width, height
            ));
        }
    }

    let is_connection_notice = wire.kind.as_deref() == Some("connection");
    let frame = match wire.thermal_data {
        Some(rows) => Some(grid_from_rows(rows, width, height)?),
        None if is_connection_notice => None,
        // Relay answered but has nothing from the sensor yet
        None if wire.status.as_deref() == Some("no_data") => None,
        None => return Err("payload carries no thermal grid".to_string()),
    };

    let sensor_model = wire.sensor_info.as_ref().and_then(|info| {
        info.get("type")
            .or_else(|| info.get("model"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    Ok(ThermalMessage {
        frame,
        is_heartbeat: is_connection_notice,
        timestamp: wire.timestamp.as_ref().and_then(timestamp_from_value),
        sensor_model,
        relay_updated_at: wire.last_update_time.and_then(finite_millis).filter(|at| *at > 0),
    })
}

fn grid_from_rows(rows: Vec<Vec<f32>>, width: usize, height: usize) -> Result<Array2<f32>, String> {
    if rows.len() != height || rows.iter().any(|row| row.len() != width) {
        return Err(format!("thermal grid is not {}x{}", width, height));
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err("thermal grid contains non-finite values".to_string());
    }

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((height, width), flat).map_err(|e| e.to_string())
}

/// What an acquisition loop reports for one stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A raw payload arrived
    Payload {
        stream: SensorKind,
        mode: TransportMode,
        body: String,
        received_at: u64,
    },
    /// A transport attempt in the given mode began
    ModeChanged {
        stream: SensorKind,
        mode: TransportMode,
    },
    /// One open, request or channel failed
    TransportFailed {
        stream: SensorKind,
        mode: TransportMode,
        error: TransportError,
        consecutive: u32,
    },
    /// Consecutive failures reached the limit; polling is paused
    FailureLimit {
        stream: SensorKind,
        failures: u32,
        cooldown_ms: u64,
    },
    /// The cooldown expired and polling resumes
    CooldownElapsed { stream: SensorKind },
}

impl StreamEvent {
    pub fn stream(&self) -> SensorKind {
        match self {
            StreamEvent::Payload { stream, .. }
            | StreamEvent::ModeChanged { stream, .. }
            | StreamEvent::TransportFailed { stream, .. }
            | StreamEvent::FailureLimit { stream, .. }
            | StreamEvent::CooldownElapsed { stream } => *stream,
        }
    }
}

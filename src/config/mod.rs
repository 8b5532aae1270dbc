// src/config/mod.rs
//! Configuration management for the telemetry subsystem

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use crate::error::{TelemetryError, TelemetryResult};
use crate::types::SensorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Complete telemetry configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub muscle: MuscleConfig,
    #[serde(default)]
    pub thermal: ThermalConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// How the sensors are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionMode {
    /// Talk to the sensor host on the local network
    Network,
    /// Sensor is tethered (serial/bluetooth) to the relay; only pulling is possible
    DirectLink,
    /// Talk to the relay server that re-publishes sensor data
    ExternalBridge,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Network => write!(f, "network"),
            ConnectionMode::DirectLink => write!(f, "direct-link"),
            ConnectionMode::ExternalBridge => write!(f, "external-bridge"),
        }
    }
}

/// Display temperature unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a Celsius reading into this unit
    pub fn from_celsius(self, celsius: f32) -> f32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => write!(f, "°C"),
            TemperatureUnit::Fahrenheit => write!(f, "°F"),
        }
    }
}

/// Liveness tracking and failure handling
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "defaults::mode")]
    pub mode: ConnectionMode,

    #[serde(default = "defaults::dwell_ms")]
    pub dwell_ms: u64,

    #[serde(default = "defaults::heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    #[serde(default = "defaults::heartbeat_stale_ms")]
    pub heartbeat_stale_ms: u64,

    #[serde(default = "defaults::sample_stale_ms")]
    pub sample_stale_ms: u64,

    #[serde(default = "defaults::muscle_recent_data_ms")]
    pub muscle_recent_data_ms: u64,

    #[serde(default = "defaults::thermal_recent_data_ms")]
    pub thermal_recent_data_ms: u64,

    #[serde(default = "defaults::failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "defaults::failure_cooldown_ms")]
    pub failure_cooldown_ms: u64,

    #[serde(default = "defaults::evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,
}

/// Per-stream thresholds handed to a [`crate::connection::ConnectionStateTracker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub dwell_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub heartbeat_stale_ms: u64,
    pub recent_data_ms: u64,
    pub sample_stale_ms: u64,
}

impl ConnectionConfig {
    pub fn tracker_config(&self, stream: SensorKind) -> TrackerConfig {
        let recent_data_ms = match stream {
            SensorKind::Muscle => self.muscle_recent_data_ms,
            SensorKind::Thermal => self.thermal_recent_data_ms,
        };
        TrackerConfig {
            dwell_ms: self.dwell_ms,
            heartbeat_timeout_ms: self.heartbeat_timeout_ms,
            heartbeat_stale_ms: self.heartbeat_stale_ms,
            recent_data_ms,
            sample_stale_ms: self.sample_stale_ms,
        }
    }
}

/// Push/pull transport settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "defaults::enable_push")]
    pub enable_push: bool,

    #[serde(default = "defaults::push_port")]
    pub push_port: u16,

    #[serde(default = "defaults::pull_port")]
    pub pull_port: u16,

    #[serde(default = "defaults::push_open_timeout_ms")]
    pub push_open_timeout_ms: u64,

    #[serde(default = "defaults::push_idle_timeout_ms")]
    pub push_idle_timeout_ms: u64,

    #[serde(default = "defaults::reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    #[serde(default = "defaults::max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "defaults::request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "defaults::muscle_poll_interval_ms")]
    pub muscle_poll_interval_ms: u64,

    #[serde(default = "defaults::thermal_poll_interval_ms")]
    pub thermal_poll_interval_ms: u64,

    #[serde(default = "defaults::relay_base_url")]
    pub relay_base_url: String,
}

impl TransportConfig {
    pub fn poll_interval(&self, stream: SensorKind) -> Duration {
        match stream {
            SensorKind::Muscle => Duration::from_millis(self.muscle_poll_interval_ms),
            SensorKind::Thermal => Duration::from_millis(self.thermal_poll_interval_ms),
        }
    }
}

/// Candidate addresses for locating the sensor host
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DiscoveryConfig {
    #[serde(default = "defaults::discovery_enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::primary_host")]
    pub primary_host: String,

    #[serde(default = "defaults::candidates")]
    pub candidates: Vec<String>,

    #[serde(default = "defaults::probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "defaults::probe_path")]
    pub probe_path: String,
}

/// Muscle-signal conditioning
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MuscleConfig {
    #[serde(default = "defaults::adc_max")]
    pub adc_max: u16,

    #[serde(default = "defaults::reference_voltage")]
    pub reference_voltage: f32,

    #[serde(default = "defaults::move_threshold_v")]
    pub move_threshold_v: f32,

    #[serde(default = "defaults::calibration_window_ms")]
    pub calibration_window_ms: u64,

    #[serde(default = "defaults::max_session_samples")]
    pub max_session_samples: usize,
}

/// Thermal-frame conditioning
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ThermalConfig {
    #[serde(default = "defaults::grid_width")]
    pub grid_width: usize,

    #[serde(default = "defaults::grid_height")]
    pub grid_height: usize,

    #[serde(default = "defaults::display_size")]
    pub display_size: usize,

    #[serde(default = "defaults::drift_threshold")]
    pub drift_threshold: f32,

    #[serde(default = "defaults::drift_factor")]
    pub drift_factor: f32,

    #[serde(default = "defaults::denoise_enabled")]
    pub denoise_enabled: bool,

    #[serde(default = "defaults::denoise_window")]
    pub denoise_window: usize,

    #[serde(default = "defaults::smoothing_factor")]
    pub smoothing_factor: f32,

    #[serde(default = "defaults::baseline_frames")]
    pub baseline_frames: usize,
}

/// Presentation of temperatures
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DisplayConfig {
    #[serde(default = "defaults::temperature_unit")]
    pub temperature_unit: TemperatureUnit,

    #[serde(default = "defaults::decimal_places")]
    pub decimal_places: u8,
}

/// Default value providers using constants
mod defaults {
    use super::{ConnectionMode, TemperatureUnit};
    use crate::config::constants::*;

    pub fn mode() -> ConnectionMode { ConnectionMode::Network }
    pub fn dwell_ms() -> u64 { connection::DEFAULT_DWELL_MS }
    pub fn heartbeat_timeout_ms() -> u64 { connection::DEFAULT_HEARTBEAT_TIMEOUT_MS }
    pub fn heartbeat_stale_ms() -> u64 { connection::DEFAULT_HEARTBEAT_STALE_MS }
    pub fn sample_stale_ms() -> u64 { connection::DEFAULT_SAMPLE_STALE_MS }
    pub fn muscle_recent_data_ms() -> u64 { connection::DEFAULT_MUSCLE_RECENT_DATA_MS }
    pub fn thermal_recent_data_ms() -> u64 { connection::DEFAULT_THERMAL_RECENT_DATA_MS }
    pub fn failure_threshold() -> u32 { connection::DEFAULT_FAILURE_THRESHOLD }
    pub fn failure_cooldown_ms() -> u64 { connection::DEFAULT_FAILURE_COOLDOWN_MS }
    pub fn evaluation_interval_ms() -> u64 { connection::DEFAULT_EVALUATION_INTERVAL_MS }

    pub fn enable_push() -> bool { true }
    pub fn push_port() -> u16 { transport::DEFAULT_PUSH_PORT }
    pub fn pull_port() -> u16 { transport::DEFAULT_PULL_PORT }
    pub fn push_open_timeout_ms() -> u64 { transport::DEFAULT_PUSH_OPEN_TIMEOUT_MS }
    pub fn push_idle_timeout_ms() -> u64 { transport::DEFAULT_PUSH_IDLE_TIMEOUT_MS }
    pub fn reconnect_backoff_ms() -> u64 { transport::DEFAULT_RECONNECT_BACKOFF_MS }
    pub fn max_reconnect_attempts() -> u32 { transport::DEFAULT_MAX_RECONNECT_ATTEMPTS }
    pub fn request_timeout_ms() -> u64 { transport::DEFAULT_REQUEST_TIMEOUT_MS }
    pub fn muscle_poll_interval_ms() -> u64 { transport::DEFAULT_MUSCLE_POLL_INTERVAL_MS }
    pub fn thermal_poll_interval_ms() -> u64 { transport::DEFAULT_THERMAL_POLL_INTERVAL_MS }
    pub fn relay_base_url() -> String { transport::DEFAULT_RELAY_BASE_URL.to_string() }

    pub fn discovery_enabled() -> bool { true }
    pub fn primary_host() -> String { discovery::DEFAULT_PRIMARY_HOST.to_string() }
    pub fn candidates() -> Vec<String> {
        discovery::DEFAULT_CANDIDATES.iter().map(|ip| ip.to_string()).collect()
    }
    pub fn probe_timeout_ms() -> u64 { discovery::DEFAULT_PROBE_TIMEOUT_MS }
    pub fn probe_path() -> String { discovery::DEFAULT_PROBE_PATH.to_string() }

    pub fn adc_max() -> u16 { muscle::ADC_MAX }
    pub fn reference_voltage() -> f32 { muscle::REFERENCE_VOLTAGE }
    pub fn move_threshold_v() -> f32 { muscle::DEFAULT_MOVE_THRESHOLD_V }
    pub fn calibration_window_ms() -> u64 { muscle::DEFAULT_CALIBRATION_WINDOW_MS }
    pub fn max_session_samples() -> usize { muscle::DEFAULT_MAX_SESSION_SAMPLES }

    pub fn grid_width() -> usize { thermal::DEFAULT_GRID_WIDTH }
    pub fn grid_height() -> usize { thermal::DEFAULT_GRID_HEIGHT }
    pub fn display_size() -> usize { thermal::DEFAULT_DISPLAY_SIZE }
    pub fn drift_threshold() -> f32 { thermal::DEFAULT_DRIFT_THRESHOLD }
    pub fn drift_factor() -> f32 { thermal::DEFAULT_DRIFT_FACTOR }
    pub fn denoise_enabled() -> bool { true }
    pub fn denoise_window() -> usize { thermal::DEFAULT_DENOISE_WINDOW }
    pub fn smoothing_factor() -> f32 { thermal::DEFAULT_SMOOTHING_FACTOR }
    pub fn baseline_frames() -> usize { thermal::DEFAULT_BASELINE_FRAMES }

    pub fn temperature_unit() -> TemperatureUnit { TemperatureUnit::Celsius }
    pub fn decimal_places() -> u8 { display::DEFAULT_DECIMAL_PLACES }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mode: defaults::mode(),
            dwell_ms: defaults::dwell_ms(),
            heartbeat_timeout_ms: defaults::heartbeat_timeout_ms(),
            heartbeat_stale_ms: defaults::heartbeat_stale_ms(),
            sample_stale_ms: defaults::sample_stale_ms(),
            muscle_recent_data_ms: defaults::muscle_recent_data_ms(),
            thermal_recent_data_ms: defaults::thermal_recent_data_ms(),
            failure_threshold: defaults::failure_threshold(),
            failure_cooldown_ms: defaults::failure_cooldown_ms(),
            evaluation_interval_ms: defaults::evaluation_interval_ms(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enable_push: defaults::enable_push(),
            push_port: defaults::push_port(),
            pull_port: defaults::pull_port(),
            push_open_timeout_ms: defaults::push_open_timeout_ms(),
            push_idle_timeout_ms: defaults::push_idle_timeout_ms(),
            reconnect_backoff_ms: defaults::reconnect_backoff_ms(),
            max_reconnect_attempts: defaults::max_reconnect_attempts(),
            request_timeout_ms: defaults::request_timeout_ms(),
            muscle_poll_interval_ms: defaults::muscle_poll_interval_ms(),
            thermal_poll_interval_ms: defaults::thermal_poll_interval_ms(),
            relay_base_url: defaults::relay_base_url(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::discovery_enabled(),
            primary_host: defaults::primary_host(),
            candidates: defaults::candidates(),
            probe_timeout_ms: defaults::probe_timeout_ms(),
            probe_path: defaults::probe_path(),
        }
    }
}

impl Default for MuscleConfig {
    fn default() -> Self {
        Self {
            adc_max: defaults::adc_max(),
            reference_voltage: defaults::reference_voltage(),
            move_threshold_v: defaults::move_threshold_v(),
            calibration_window_ms: defaults::calibration_window_ms(),
            max_session_samples: defaults::max_session_samples(),
        }
    }
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            grid_width: defaults::grid_width(),
            grid_height: defaults::grid_height(),
            display_size: defaults::display_size(),
            drift_threshold: defaults::drift_threshold(),
            drift_factor: defaults::drift_factor(),
            denoise_enabled: defaults::denoise_enabled(),
            denoise_window: defaults::denoise_window(),
            smoothing_factor: defaults::smoothing_factor(),
            baseline_frames: defaults::baseline_frames(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            temperature_unit: defaults::temperature_unit(),
            decimal_places: defaults::decimal_places(),
        }
    }
}

impl TelemetryConfig {
    /// Validate configuration consistency, collecting every violation
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let c = &self.connection;
        let t = &self.transport;

        if c.heartbeat_stale_ms < c.heartbeat_timeout_ms {
            errors.push(format!(
                "Heartbeat stale bound ({} ms) must not be below the heartbeat timeout ({} ms)",
                c.heartbeat_stale_ms, c.heartbeat_timeout_ms
            ));
        }

        for (name, window) in [
            ("muscle", c.muscle_recent_data_ms),
            ("thermal", c.thermal_recent_data_ms),
        ] {
            if !(constants::connection::MIN_RECENT_DATA_MS..=constants::connection::MAX_RECENT_DATA_MS)
                .contains(&window)
            {
                errors.push(format!(
                    "{} recent-data window ({} ms) must be within {}..={} ms",
                    name,
                    window,
                    constants::connection::MIN_RECENT_DATA_MS,
                    constants::connection::MAX_RECENT_DATA_MS
                ));
            }
        }

        if c.failure_threshold == 0 {
            errors.push("Failure threshold must be at least 1".to_string());
        }

        if c.evaluation_interval_ms == 0 {
            errors.push("Evaluation interval must be positive".to_string());
        }

        if !(constants::transport::MIN_REQUEST_TIMEOUT_MS..=constants::transport::MAX_REQUEST_TIMEOUT_MS)
            .contains(&t.request_timeout_ms)
        {
            errors.push(format!("Invalid request timeout: {} ms", t.request_timeout_ms));
        }

        if t.push_open_timeout_ms == 0 {
            errors.push("Push open timeout must be positive".to_string());
        }

        for (name, interval) in [
            ("muscle", t.muscle_poll_interval_ms),
            ("thermal", t.thermal_poll_interval_ms),
        ] {
            if interval < constants::transport::MIN_POLL_INTERVAL_MS {
                errors.push(format!(
                    "{} poll interval ({} ms) is below the {} ms minimum",
                    name,
                    interval,
                    constants::transport::MIN_POLL_INTERVAL_MS
                ));
            }
        }

        if t.push_port == 0 || t.pull_port == 0 {
            errors.push("Push and pull ports must be non-zero".to_string());
        }

        if self.discovery.enabled && self.discovery.candidates.is_empty() {
            errors.push("Discovery is enabled but no candidates are configured".to_string());
        }

        if self.muscle.adc_max == 0 || self.muscle.reference_voltage <= 0.0 {
            errors.push("ADC range and reference voltage must be positive".to_string());
        }

        if self.muscle.move_threshold_v <= 0.0 {
            errors.push(format!("Move threshold must be positive, got {}", self.muscle.move_threshold_v));
        }

        let th = &self.thermal;
        if th.grid_width == 0 || th.grid_height == 0 {
            errors.push("Thermal grid dimensions must be non-zero".to_string());
        }

        if th.display_size < th.grid_width.max(th.grid_height)
            || th.display_size > constants::thermal::MAX_DISPLAY_SIZE
        {
            errors.push(format!(
                "Display size {} must be between the native grid and {}",
                th.display_size,
                constants::thermal::MAX_DISPLAY_SIZE
            ));
        }

        if !(0.0..=1.0).contains(&th.smoothing_factor) || !(0.0..=1.0).contains(&th.drift_factor) {
            errors.push("Smoothing and drift factors must be within 0.0..=1.0".to_string());
        }

        if th.denoise_window == 0 || th.baseline_frames == 0 {
            errors.push("Denoise window and baseline frame count must be non-zero".to_string());
        }

        if self.display.decimal_places > constants::display::MAX_DECIMAL_PLACES {
            errors.push(format!(
                "Decimal precision {} exceeds maximum of {}",
                self.display.decimal_places,
                constants::display::MAX_DECIMAL_PLACES
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert violations into a single configuration error
    pub fn validate(&self) -> TelemetryResult<()> {
        self.validate_consistency().map_err(|errors| {
            TelemetryError::configuration(
                "telemetry_config",
                errors.join("; "),
                crate::error_context!("config", "validate"),
            )
        })
    }

    /// Get configuration summary
    pub fn get_summary(&self) -> ConfigSummary {
        ConfigSummary {
            mode: self.connection.mode,
            dwell_ms: self.connection.dwell_ms,
            muscle_poll_interval_ms: self.transport.muscle_poll_interval_ms,
            thermal_poll_interval_ms: self.transport.thermal_poll_interval_ms,
            push_enabled: self.transport.enable_push,
            grid: (self.thermal.grid_width, self.thermal.grid_height),
            display_size: self.thermal.display_size,
        }
    }
}

/// Configuration summary for display/logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub mode: ConnectionMode,
    pub dwell_ms: u64,
    pub muscle_poll_interval_ms: u64,
    pub thermal_poll_interval_ms: u64,
    pub push_enabled: bool,
    pub grid: (usize, usize),
    pub display_size: usize,
}

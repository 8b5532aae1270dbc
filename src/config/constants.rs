// src/config/constants.rs
//! System-wide configuration constants
//!
//! These are product-tuned defaults, not physics. Every one of them is
//! overridable through [`crate::config::TelemetryConfig`].

/// Connection state tracking constants
pub mod connection {
    /// Minimum time a state must persist before another transition
    pub const DEFAULT_DWELL_MS: u64 = 10_000;
    /// Heartbeat younger than this means the device should be connected
    pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;
    /// Heartbeat older than this is definitely stale
    pub const DEFAULT_HEARTBEAT_STALE_MS: u64 = 35_000;
    /// Sample older than this is definitely stale
    pub const DEFAULT_SAMPLE_STALE_MS: u64 = 45_000;
    /// Recent-data windows per stream
    pub const DEFAULT_MUSCLE_RECENT_DATA_MS: u64 = 10_000;
    pub const DEFAULT_THERMAL_RECENT_DATA_MS: u64 = 30_000;
    pub const MIN_RECENT_DATA_MS: u64 = 10_000;
    pub const MAX_RECENT_DATA_MS: u64 = 60_000;

    /// Consecutive transport failures before polling is paused
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 15;
    pub const DEFAULT_FAILURE_COOLDOWN_MS: u64 = 30_000;

    /// How often the monitor re-evaluates liveness
    pub const DEFAULT_EVALUATION_INTERVAL_MS: u64 = 1_000;
}

/// Transport constants
pub mod transport {
    /// WebSocket port on the sensor host
    pub const DEFAULT_PUSH_PORT: u16 = 8091;
    pub const DEFAULT_PULL_PORT: u16 = 8091;
    /// Bound on opening the push channel
    pub const DEFAULT_PUSH_OPEN_TIMEOUT_MS: u64 = 5_000;
    /// A push channel silent for longer than this is treated as an unclean close
    pub const DEFAULT_PUSH_IDLE_TIMEOUT_MS: u64 = 10_000;
    /// Fixed backoff between push reconnect attempts
    pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 3_000;
    pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;
    /// Bound on a single pull request
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
    pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
    pub const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;

    pub const DEFAULT_MUSCLE_POLL_INTERVAL_MS: u64 = 1_000;
    pub const DEFAULT_THERMAL_POLL_INTERVAL_MS: u64 = 100;
    pub const MIN_POLL_INTERVAL_MS: u64 = 10;

    /// Relay (external bridge) defaults
    pub const DEFAULT_RELAY_BASE_URL: &str = "http://localhost:3000";
    pub const RELAY_MUSCLE_PULL_PATH: &str = "/api/emg/data";
    pub const RELAY_MUSCLE_PUSH_PATH: &str = "/api/emg/stream";
    pub const RELAY_THERMAL_PULL_PATH: &str = "/api/thermal/bt";

    /// Sensor host paths
    pub const SENSOR_THERMAL_PULL_PATH: &str = "/thermal-data";

    /// Event stream framing
    pub const EVENT_DATA_PREFIX: &str = "data:";
    pub const MAX_EVENT_BYTES: usize = 65_536;
}

/// Device discovery constants
pub mod discovery {
    pub const DEFAULT_PRIMARY_HOST: &str = "192.168.1.100";
    pub const DEFAULT_CANDIDATES: [&str; 6] = [
        "192.168.1.100",
        "192.168.0.100",
        "192.168.1.50",
        "192.168.0.50",
        "10.0.0.100",
        "172.16.0.100",
    ];
    pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
    pub const DEFAULT_PROBE_PATH: &str = "/thermal-data";
}

/// Muscle signal constants (ESP32 12-bit ADC, 3.3 V reference)
pub mod muscle {
    pub const ADC_MAX: u16 = 4095;
    pub const REFERENCE_VOLTAGE: f32 = 3.3;
    pub const DEFAULT_MOVE_THRESHOLD_V: f32 = 0.15;
    pub const DEFAULT_CALIBRATION_WINDOW_MS: u64 = 5_000;
    /// Safe range used when no calibration exists or capture was degenerate
    pub const DEFAULT_CALIBRATION_MIN: f32 = 400.0;
    pub const DEFAULT_CALIBRATION_MAX: f32 = 600.0;
    /// Samples retained per session for display and annotation
    pub const DEFAULT_MAX_SESSION_SAMPLES: usize = 1_000;
    pub const ACTIVATION_MIN: f32 = 0.0;
    pub const ACTIVATION_MAX: f32 = 100.0;
}

/// Thermal frame constants
pub mod thermal {
    pub const DEFAULT_GRID_WIDTH: usize = 8;
    pub const DEFAULT_GRID_HEIGHT: usize = 8;
    pub const DEFAULT_DISPLAY_SIZE: usize = 32;
    pub const MAX_DISPLAY_SIZE: usize = 512;
    pub const DEFAULT_DRIFT_THRESHOLD: f32 = 0.6;
    pub const DEFAULT_DRIFT_FACTOR: f32 = 0.02;
    pub const DEFAULT_DENOISE_WINDOW: usize = 5;
    pub const DEFAULT_SMOOTHING_FACTOR: f32 = 0.2;
    /// Frames averaged into a fresh baseline
    pub const DEFAULT_BASELINE_FRAMES: usize = 10;

    /// Frame statistics thresholds
    pub const STABLE_VARIANCE_THRESHOLD: f32 = 8.0;
    pub const STABLE_RANGE_THRESHOLD: f32 = 4.0;
    pub const BASELINE_STATS_WINDOW: usize = 10;
    pub const THERMAL_EVENT_THRESHOLD_C: f32 = 2.0;
}

/// Display constants
pub mod display {
    pub const DEFAULT_DECIMAL_PLACES: u8 = 1;
    pub const MAX_DECIMAL_PLACES: u8 = 4;
}

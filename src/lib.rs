//! biosignal-core: real-time telemetry for a muscle-activity sensor and an 8x8 thermal array
//!
//! This library keeps an honest "is the device live right now" judgment over
//! unreliable transports and turns raw readings into display-ready signals. It
//! features:
//!
//! - Candidate-based sensor discovery
//! - Push-first acquisition with automatic fallback to interval pulling
//! - Debounced tri-state connection tracking with a consecutive-failure governor
//! - Muscle calibration, activation mapping and movement detection
//! - Thermal baseline correction, denoising, smoothing and upscaling
//! - Movement-period annotation over operator and sensed markers
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use biosignal_core::config::TelemetryConfig;
//! use biosignal_core::monitor::TelemetryMonitor;
//! use biosignal_core::utils::time::SystemTimeProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut monitor = TelemetryMonitor::new(TelemetryConfig::default(), Arc::new(SystemTimeProvider))?;
//!     let mut changes = monitor.subscribe_changes();
//!
//!     monitor.start().await?;
//!     while let Ok(change) = changes.recv().await {
//!         println!("{} is now {}", change.stream, change.to);
//!     }
//!
//!     monitor.shutdown();
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod monitor;
pub mod processing;
pub mod session;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::{ConfigLoader, ConnectionMode, TelemetryConfig, TemperatureUnit};
pub use connection::{ConnectionStateTracker, DebounceGuard, FailureGovernor};
pub use discovery::{DeviceDiscovery, HttpProbe, Probe};
pub use error::{ErrorContext, TelemetryError, TelemetryResult, TransportError};
pub use monitor::{MonitorStatus, TelemetryMonitor};
pub use processing::{annotate, CalibrationRange, DisplayFrame, MuscleProcessor, ThermalProcessor};
pub use session::{MuscleSession, StreamSession, ThermalSession};
pub use transport::{FallbackChain, PullSource, PushChannel, PushConnector, StreamEvent, StreamTransports};
pub use types::{
    ConnectionState, HeartbeatRecord, MarkerKind, MoveMarker, MovementPeriod, ProcessedSample, RawSample,
    SensorKind, StateChange, TransportMode,
};

pub use utils::time::{current_timestamp_millis, TimeProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "Real-time biosensor telemetry: acquisition, liveness and signal conditioning".to_string(),
        features: vec![
            "Sensor discovery".to_string(),
            "Push-to-pull transport fallback".to_string(),
            "Debounced connection tracking".to_string(),
            "Muscle signal calibration".to_string(),
            "Thermal frame conditioning".to_string(),
            "Movement annotation".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}

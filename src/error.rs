// src/error.rs
//! Unified error handling for the telemetry subsystem
//!
//! Every failure in this crate degrades to either a visible status change or a
//! dropped sample. Nothing here is allowed to take the host process down, so
//! the error types carry enough context for logging and for the operator UI
//! but are never escalated past the session that produced them.

use crate::types::SensorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

/// Transport-level failures (connection refused, timeouts, bad status, closes)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// The remote end refused or reset the connection
    #[error("connection to {endpoint} refused: {reason}")]
    Refused { endpoint: String, reason: String },

    /// An open or request did not complete within its bound
    #[error("{operation} on {endpoint} timed out after {timeout_ms} ms")]
    Timeout {
        endpoint: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The remote answered with a non-success HTTP status
    #[error("{endpoint} answered HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// The preferred transport cannot run in this environment
    #[error("push transport unsupported: {0}")]
    Unsupported(String),

    /// An established channel closed
    #[error("channel to {endpoint} closed ({})", close_kind(.clean))]
    Closed { endpoint: String, clean: bool },

    /// Any other request failure (DNS, body read, protocol)
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },
}

fn close_kind(clean: &bool) -> &'static str {
    if *clean {
        "clean"
    } else {
        "unclean"
    }
}

impl TransportError {
    /// Whether this failure should be treated like an unclean close of a push channel
    pub fn is_unclean(&self) -> bool {
        !matches!(self, TransportError::Closed { clean: true, .. })
    }
}

/// Unified error type for the telemetry subsystem
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    /// Connection refused/timeout; triggers fallback or reconnect
    #[error("[TRANSPORT] {stream} stream: {source} ({})", .context.operation)]
    Transport {
        stream: SensorKind,
        #[source]
        source: TransportError,
        context: ErrorContext,
    },

    /// Malformed payload; the sample is dropped and the stream continues
    #[error("[PARSE] dropped {stream} payload: {reason} ({})", .context.operation)]
    Parse {
        stream: SensorKind,
        reason: String,
        context: ErrorContext,
    },

    /// Calibration window produced max <= min; defaults were substituted
    #[error("[CALIBRATION] degenerate range (min {min}, max {max}); defaults substituted")]
    CalibrationDegenerate {
        min: f32,
        max: f32,
        context: ErrorContext,
    },

    /// No discovery candidate responded
    #[error("[DISCOVERY] sensor not found: none of {candidates} candidate(s) responded")]
    DiscoveryExhausted {
        candidates: usize,
        context: ErrorContext,
    },

    /// Too many consecutive transport errors; polling paused for a cooldown
    #[error("[FAILURES] {stream} stream hit {failures} consecutive transport failures; polling paused for {cooldown_ms} ms")]
    ConsecutiveFailureLimit {
        stream: SensorKind,
        failures: u32,
        cooldown_ms: u64,
        context: ErrorContext,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("[CONFIG] {component}: {reason}")]
    Configuration {
        component: String,
        reason: String,
        context: ErrorContext,
    },

    /// Local file I/O (config files, exports)
    #[error("[IO] {path}: {reason}")]
    Io {
        path: String,
        reason: String,
        context: ErrorContext,
    },
}

/// What a failure turns into from the operator's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degradation {
    /// The connection status indicator changes
    StatusChange,
    /// One sample or frame is discarded
    DroppedSample,
    /// A safe default replaced a computed value
    Substituted,
    /// A message is shown, the operator may retry
    OperatorNotice,
}

impl TelemetryError {
    /// Map the error onto its visible consequence
    pub fn degradation(&self) -> Degradation {
        match self {
            TelemetryError::Transport { .. } => Degradation::StatusChange,
            TelemetryError::ConsecutiveFailureLimit { .. } => Degradation::StatusChange,
            TelemetryError::Parse { .. } => Degradation::DroppedSample,
            TelemetryError::CalibrationDegenerate { .. } => Degradation::Substituted,
            TelemetryError::DiscoveryExhausted { .. } => Degradation::OperatorNotice,
            TelemetryError::Configuration { .. } | TelemetryError::Io { .. } => {
                Degradation::OperatorNotice
            }
        }
    }

    /// Context attached when the error was raised
    pub fn context(&self) -> &ErrorContext {
        match self {
            TelemetryError::Transport { context, .. }
            | TelemetryError::Parse { context, .. }
            | TelemetryError::CalibrationDegenerate { context, .. }
            | TelemetryError::DiscoveryExhausted { context, .. }
            | TelemetryError::ConsecutiveFailureLimit { context, .. }
            | TelemetryError::Configuration { context, .. }
            | TelemetryError::Io { context, .. } => context,
        }
    }

    pub fn transport(stream: SensorKind, source: TransportError, context: ErrorContext) -> Self {
        TelemetryError::Transport { stream, source, context }
    }

    pub fn parse(stream: SensorKind, reason: impl Into<String>, context: ErrorContext) -> Self {
        TelemetryError::Parse {
            stream,
            reason: reason.into(),
            context,
        }
    }

    pub fn configuration(component: &str, reason: impl Into<String>, context: ErrorContext) -> Self {
        TelemetryError::Configuration {
            component: component.to_string(),
            reason: reason.into(),
            context,
        }
    }
}

/// Error context for debugging and analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub component: String,
    pub operation: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub additional_info: HashMap<String, String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
            additional_info: HashMap::new(),
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file.to_string());
        context.line = Some(line);
        context
    }

    /// Add additional information to the context
    pub fn add_info<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional_info.insert(key.into(), value.into());
        self
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

/// Result type alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("tracker", "evaluate");
        assert_eq!(context.component, "tracker");
        assert_eq!(context.operation, "evaluate");
        assert!(context.file.is_none());
        assert!(context.timestamp <= SystemTime::now());
    }

    #[test]
    fn test_error_context_macro_captures_location() {
        let context = crate::error_context!("discovery", "probe");
        assert_eq!(context.file.as_deref(), Some(file!()));
        assert!(context.line.unwrap_or(0) > 0);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout {
            endpoint: "http://10.0.0.100:8091/thermal-data".to_string(),
            operation: "pull",
            timeout_ms: 5000,
        };
        let display = err.to_string();
        assert!(display.contains("timed out after 5000 ms"));
        assert!(display.contains("10.0.0.100"));

        let closed = TransportError::Closed { endpoint: "ws".into(), clean: true };
        assert!(closed.to_string().contains("clean"));
        assert!(!closed.is_unclean());
    }

    #[test]
    fn test_telemetry_error_wraps_source() {
        use std::error::Error;

        let err = TelemetryError::transport(
            SensorKind::Thermal,
            TransportError::Status { endpoint: "pi".into(), status: 503 },
            ErrorContext::new("fallback", "pull"),
        );
        assert!(err.to_string().contains("thermal"));
        assert!(err.source().is_some());
        assert_eq!(err.degradation(), Degradation::StatusChange);
    }

    #[test]
    fn test_degradation_mapping() {
        let parse = TelemetryError::parse(SensorKind::Muscle, "bad json", ErrorContext::new("session", "ingest"));
        assert_eq!(parse.degradation(), Degradation::DroppedSample);

        let exhausted = TelemetryError::DiscoveryExhausted {
            candidates: 6,
            context: ErrorContext::new("discovery", "discover"),
        };
        assert_eq!(exhausted.degradation(), Degradation::OperatorNotice);
        assert!(exhausted.to_string().contains("not found"));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TelemetryError>();
        assert_send_sync::<TransportError>();
    }
}

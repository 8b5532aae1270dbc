// src/processing/calibration.rs
//! Operator-driven calibration window for muscle activation bounds

use crate::config::constants::muscle::{DEFAULT_CALIBRATION_MAX, DEFAULT_CALIBRATION_MIN};
use crate::error::TelemetryError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Raw-count bounds mapping a reading onto 0..=100 % activation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRange {
    pub min: f32,
    pub max: f32,
}

impl CalibrationRange {
    /// Safe range used when no calibration exists
    pub const DEFAULT: CalibrationRange = CalibrationRange {
        min: DEFAULT_CALIBRATION_MIN,
        max: DEFAULT_CALIBRATION_MAX,
    };

    /// `None` unless both bounds are finite and `max > min`
    pub fn new(min: f32, max: f32) -> Option<Self> {
        let range = Self { min, max };
        range.is_valid().then_some(range)
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }
}

impl Default for CalibrationRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Result of closing a calibration window
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    /// The range to store for the session; always valid
    pub range: CalibrationRange,
    pub samples: usize,
    /// Set when the captured range was degenerate and the default was substituted
    pub warning: Option<TelemetryError>,
}

impl CalibrationOutcome {
    pub fn substituted(&self) -> bool {
        self.warning.is_some()
    }
}

/// Tracks running extremes while a calibration window is open
#[derive(Debug, Clone)]
pub struct CalibrationCapture {
    window_ms: u64,
    started_at: Option<u64>,
    running_min: f32,
    running_max: f32,
    samples: usize,
}

impl CalibrationCapture {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            started_at: None,
            running_min: f32::INFINITY,
            running_max: f32::NEG_INFINITY,
            samples: 0,
        }
    }

    /// Open the window, discarding any previous extremes
    pub fn start(&mut self, now_ms: u64) {
        self.started_at = Some(now_ms);
        self.running_min = f32::INFINITY;
        self.running_max = f32::NEG_INFINITY;
        self.samples = 0;
        info!(window_ms = self.window_ms, "Calibration started");
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    pub fn is_window_elapsed(&self, now_ms: u64) -> bool {
        self.started_at
            .map_or(false, |start| now_ms.saturating_sub(start) >= self.window_ms)
    }

    /// Fold a raw reading into the extremes if it falls inside the window
    pub fn observe(&mut self, raw: f32, received_at: u64) -> bool {
        let Some(start) = self.started_at else {
            return false;
        };
        if received_at < start || received_at.saturating_sub(start) >= self.window_ms || !raw.is_finite() {
            return false;
        }
        self.running_min = self.running_min.min(raw);
        self.running_max = self.running_max.max(raw);
        self.samples += 1;
        true
    }

    /// Close the window if it has elapsed
    pub fn poll(&mut self, now_ms: u64) -> Option<CalibrationOutcome> {
        if self.is_window_elapsed(now_ms) {
            self.finish()
        } else {
            None
        }
    }

    /// Close the window now (operator stop). `None` if it was not running.
    pub fn finish(&mut self) -> Option<CalibrationOutcome> {
        self.started_at.take()?;

        let outcome = match CalibrationRange::new(self.running_min, self.running_max) {
            Some(range) => {
                info!(min = range.min, max = range.max, samples = self.samples, "Calibration complete");
                CalibrationOutcome {
                    range,
                    samples: self.samples,
                    warning: None,
                }
            }
            None => {
                let error = TelemetryError::CalibrationDegenerate {
                    min: self.running_min,
                    max: self.running_max,
                    context: crate::error_context!("calibration", "finish")
                        .add_info("samples", self.samples.to_string()),
                };
                warn!(error = %error, "Calibration degenerate");
                CalibrationOutcome {
                    range: CalibrationRange::DEFAULT,
                    samples: self.samples,
                    warning: Some(error),
                }
            }
        };
        Some(outcome)
    }

    /// Abandon the window without producing a range
    pub fn cancel(&mut self) {
        self.started_at = None;
        self.running_min = f32::INFINITY;
        self.running_max = f32::NEG_INFINITY;
        self.samples = 0;
    }
}

// src/processing/muscle.rs
//! Muscle-signal conditioning: voltage, calibrated activation, movement detection

use crate::config::constants::muscle::{ACTIVATION_MAX, ACTIVATION_MIN, ADC_MAX, REFERENCE_VOLTAGE};
use crate::config::MuscleConfig;
use crate::processing::calibration::{CalibrationCapture, CalibrationOutcome, CalibrationRange};
use crate::types::{ProcessedSample, RawSample};

/// ADC counts to volts for the 12-bit, 3.3 V sensor
pub fn to_voltage(raw: u16) -> f32 {
    to_voltage_with(raw, REFERENCE_VOLTAGE, ADC_MAX)
}

pub fn to_voltage_with(raw: u16, reference_voltage: f32, adc_max: u16) -> f32 {
    if adc_max == 0 {
        return 0.0;
    }
    raw as f32 * reference_voltage / adc_max as f32
}

/// Map a raw reading onto 0..=100 % of the calibrated range.
/// Missing or invalid calibration falls back to the default range.
pub fn to_activation_percent(raw: f32, calibration: Option<&CalibrationRange>) -> f32 {
    let range = calibration
        .filter(|range| range.is_valid())
        .copied()
        .unwrap_or_default();

    let percent = (raw - range.min) / range.span() * 100.0;
    if percent.is_nan() {
        return ACTIVATION_MIN;
    }
    percent.clamp(ACTIVATION_MIN, ACTIVATION_MAX)
}

/// A movement is a voltage step of at least `threshold` from the previous reading
pub fn detect_move(current: f32, previous: Option<f32>, threshold: f32) -> bool {
    match previous {
        Some(previous) => (current - previous).abs() >= threshold,
        None => false,
    }
}

/// Result of feeding one sample through the processor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuscleReading {
    pub sample: ProcessedSample,
    /// The step from the previous sample qualified as a movement
    pub moved: bool,
}

/// Per-session muscle processor; owns the calibration state
#[derive(Debug, Clone)]
pub struct MuscleProcessor {
    config: MuscleConfig,
    calibration: Option<CalibrationRange>,
    capture: CalibrationCapture,
    previous_voltage: Option<f32>,
}

impl MuscleProcessor {
    pub fn new(config: MuscleConfig) -> Self {
        let capture = CalibrationCapture::new(config.calibration_window_ms);
        Self {
            config,
            calibration: None,
            capture,
            previous_voltage: None,
        }
    }

    /// Reported voltage when present, otherwise derived from the raw value
    pub fn voltage_of(&self, raw: &RawSample) -> f32 {
        raw.voltage
            .filter(|v| v.is_finite())
            .unwrap_or_else(|| to_voltage_with(raw.raw_value, self.config.reference_voltage, self.config.adc_max))
    }

    /// Stateless conversion using the current calibration
    pub fn process(&self, raw: RawSample) -> ProcessedSample {
        ProcessedSample {
            raw,
            voltage: self.voltage_of(&raw),
            activation_percent: to_activation_percent(raw.raw_value as f32, self.calibration.as_ref()),
        }
    }

    /// Process a sample in arrival order, feeding calibration and movement detection
    pub fn ingest(&mut self, raw: RawSample, received_at: u64) -> MuscleReading {
        if self.capture.is_running() {
            self.capture.observe(raw.raw_value as f32, received_at);
        }

        let sample = self.process(raw);
        let moved = detect_move(sample.voltage, self.previous_voltage, self.config.move_threshold_v);
        self.previous_voltage = Some(sample.voltage);

        MuscleReading { sample, moved }
    }

    pub fn start_calibration(&mut self, now_ms: u64) {
        self.capture.start(now_ms);
    }

    pub fn is_calibrating(&self) -> bool {
        self.capture.is_running()
    }

    /// Operator stop; stores and returns the finalized range
    pub fn stop_calibration(&mut self) -> Option<CalibrationOutcome> {
        let outcome = self.capture.finish()?;
        self.calibration = Some(outcome.range);
        Some(outcome)
    }

    /// Close the window once it has elapsed
    pub fn poll_calibration(&mut self, now_ms: u64) -> Option<CalibrationOutcome> {
        let outcome = self.capture.poll(now_ms)?;
        self.calibration = Some(outcome.range);
        Some(outcome)
    }

    pub fn calibration(&self) -> Option<CalibrationRange> {
        self.calibration
    }

    /// Install a previously stored range; invalid ranges are ignored
    pub fn set_calibration(&mut self, range: CalibrationRange) -> bool {
        if range.is_valid() {
            self.calibration = Some(range);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.calibration = None;
        self.capture.cancel();
        self.previous_voltage = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuscleConfig;

    fn raw(timestamp: u64, raw_value: u16) -> RawSample {
        RawSample {
            timestamp,
            raw_value,
            voltage: None,
        }
    }

    #[test]
    fn test_voltage_conversion() {
        assert_eq!(to_voltage(0), 0.0);
        assert!((to_voltage(4095) - 3.3).abs() < 1e-6);
        assert!((to_voltage(2048) - 1.650_403).abs() < 1e-4);
    }

    #[test]
    fn test_activation_with_explicit_range() {
        let range = CalibrationRange { min: 0.0, max: 100.0 };
        assert_eq!(to_activation_percent(0.0, Some(&range)), 0.0);
        assert_eq!(to_activation_percent(100.0, Some(&range)), 100.0);
        assert_eq!(to_activation_percent(150.0, Some(&range)), 100.0);
    }

    #[test]
    fn test_activation_defaults_without_calibration() {
        assert_eq!(to_activation_percent(400.0, None), 0.0);
        assert_eq!(to_activation_percent(500.0, None), 50.0);
        assert_eq!(to_activation_percent(600.0, None), 100.0);

        let broken = CalibrationRange { min: 5.0, max: 5.0 };
        assert_eq!(to_activation_percent(500.0, Some(&broken)), 50.0);
    }

    #[test]
    fn test_detect_move() {
        assert!(!detect_move(2.0, None, 0.15));
        assert!(detect_move(0.5, Some(0.3), 0.15));
        assert!(detect_move(0.3, Some(0.5), 0.15));
        assert!(!detect_move(0.4, Some(0.3), 0.15));
    }

    #[test]
    fn test_reported_voltage_wins() {
        let processor = MuscleProcessor::new(MuscleConfig::default());
        let sample = processor.process(RawSample {
            timestamp: 1,
            raw_value: 1000,
            voltage: Some(2.1),
        });
        assert_eq!(sample.voltage, 2.1);
    }

    #[test]
    fn test_ingest_flags_moves() {
        let mut processor = MuscleProcessor::new(MuscleConfig::default());
        assert!(!processor.ingest(raw(0, 500), 0).moved);
        assert!(!processor.ingest(raw(1, 520), 1).moved);
        // ~0.24 V step
        assert!(processor.ingest(raw(2, 820), 2).moved);
        assert!(!processor.ingest(raw(3, 830), 3).moved);
    }

    #[test]
    fn test_calibration_lifecycle() {
        let mut processor = MuscleProcessor::new(MuscleConfig::default());
        processor.start_calibration(0);
        processor.ingest(raw(10, 300), 10);
        processor.ingest(raw(20, 900), 20);
        assert!(processor.is_calibrating());

        let outcome = processor.poll_calibration(5_000).unwrap();
        assert_eq!(outcome.range, CalibrationRange { min: 300.0, max: 900.0 });
        assert_eq!(processor.calibration(), Some(outcome.range));

        let sample = processor.process(raw(30, 600));
        assert_eq!(sample.activation_percent, 50.0);

        processor.reset();
        assert!(processor.calibration().is_none());
    }
}

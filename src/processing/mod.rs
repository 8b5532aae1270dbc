// src/processing/mod.rs
//! Signal conditioning for both sensor streams

pub mod annotation;
pub mod calibration;
pub mod muscle;
pub mod stats;
pub mod thermal;

pub use annotation::{annotate, peak_between};
pub use calibration::{CalibrationCapture, CalibrationOutcome, CalibrationRange};
pub use muscle::{detect_move, to_activation_percent, to_voltage, MuscleProcessor, MuscleReading};
pub use stats::{
    baseline_from_stats, detect_thermal_event, is_stable_frame, muscle_stats, thermal_stats,
    MuscleStats, ThermalStats,
};
pub use thermal::{
    apply_baseline, denoise, smooth, upscale, BaselineCapture, DisplayFrame, ExponentialSmoother, FrameHistory,
    ThermalProcessor,
};

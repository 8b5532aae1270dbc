// src/processing/stats.rs
//! Summary statistics over muscle readings and thermal frames

use crate::config::constants::thermal::{
    BASELINE_STATS_WINDOW, STABLE_RANGE_THRESHOLD, STABLE_VARIANCE_THRESHOLD, THERMAL_EVENT_THRESHOLD_C,
};
use crate::types::ProcessedSample;
use ndarray::Array2;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MuscleStats {
    pub average_voltage: Option<f32>,
    pub max_voltage: Option<f32>,
    pub min_voltage: Option<f32>,
    /// All samples, including those without a usable voltage
    pub sample_count: usize,
}

/// Voltage summary; non-finite voltages are ignored
pub fn muscle_stats(samples: &[ProcessedSample]) -> MuscleStats {
    let voltages: Vec<f32> = samples
        .iter()
        .map(|s| s.voltage)
        .filter(|v| v.is_finite())
        .collect();

    if voltages.is_empty() {
        return MuscleStats {
            average_voltage: None,
            max_voltage: None,
            min_voltage: None,
            sample_count: samples.len(),
        };
    }

    let sum: f32 = voltages.iter().sum();
    MuscleStats {
        average_voltage: Some(sum / voltages.len() as f32),
        max_voltage: voltages.iter().copied().reduce(f32::max),
        min_voltage: voltages.iter().copied().reduce(f32::min),
        sample_count: samples.len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ThermalStats {
    pub average: f32,
    pub min: f32,
    pub max: f32,
    pub range: f32,
    /// Population variance
    pub variance: f32,
}

pub fn thermal_stats(frame: &Array2<f32>) -> ThermalStats {
    if frame.is_empty() {
        return ThermalStats::default();
    }

    let count = frame.len() as f32;
    let average = frame.sum() / count;
    let min = frame.iter().copied().fold(f32::INFINITY, f32::min);
    let max = frame.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let variance = frame.iter().map(|v| (v - average).powi(2)).sum::<f32>() / count;

    ThermalStats {
        average,
        min,
        max,
        range: max - min,
        variance,
    }
}

/// A frame is stable once a baseline exists and the scene is flat
pub fn is_stable_frame(stats: &ThermalStats, baseline: Option<f32>) -> bool {
    baseline.is_some() && stats.range < STABLE_RANGE_THRESHOLD && stats.variance < STABLE_VARIANCE_THRESHOLD
}

/// Mean of the last `BASELINE_STATS_WINDOW` frame averages
pub fn baseline_from_stats(history: &[ThermalStats]) -> Option<f32> {
    if history.len() < BASELINE_STATS_WINDOW {
        return None;
    }
    let recent = &history[history.len() - BASELINE_STATS_WINDOW..];
    Some(recent.iter().map(|s| s.average).sum::<f32>() / recent.len() as f32)
}

pub fn detect_thermal_event(current: f32, baseline: Option<f32>) -> bool {
    baseline.map_or(false, |b| (current - b).abs() >= THERMAL_EVENT_THRESHOLD_C)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawSample;
    use ndarray::array;

    fn sample(voltage: f32) -> ProcessedSample {
        ProcessedSample {
            raw: RawSample {
                timestamp: 0,
                raw_value: 0,
                voltage: None,
            },
            voltage,
            activation_percent: 0.0,
        }
    }

    #[test]
    fn test_muscle_stats() {
        let stats = muscle_stats(&[sample(1.0), sample(2.0), sample(f32::NAN), sample(3.0)]);
        assert_eq!(stats.average_voltage, Some(2.0));
        assert_eq!(stats.max_voltage, Some(3.0));
        assert_eq!(stats.min_voltage, Some(1.0));
        assert_eq!(stats.sample_count, 4);

        let empty = muscle_stats(&[]);
        assert_eq!(empty.average_voltage, None);
        assert_eq!(empty.sample_count, 0);
    }

    #[test]
    fn test_thermal_stats() {
        let frame = array![[20.0, 22.0], [24.0, 26.0]];
        let stats = thermal_stats(&frame);
        assert_eq!(stats.average, 23.0);
        assert_eq!(stats.min, 20.0);
        assert_eq!(stats.max, 26.0);
        assert_eq!(stats.range, 6.0);
        assert_eq!(stats.variance, 5.0);
    }

    #[test]
    fn test_stability_requires_baseline() {
        let flat = thermal_stats(&array![[25.0, 25.5], [25.2, 25.1]]);
        assert!(!is_stable_frame(&flat, None));
        assert!(is_stable_frame(&flat, Some(25.0)));

        let busy = thermal_stats(&array![[20.0, 30.0], [20.0, 30.0]]);
        assert!(!is_stable_frame(&busy, Some(25.0)));
    }

    #[test]
    fn test_baseline_needs_full_window() {
        let history: Vec<ThermalStats> = (0..BASELINE_STATS_WINDOW)
            .map(|i| ThermalStats {
                average: if i == 0 { 100.0 } else { 24.0 },
                ..ThermalStats::default()
            })
            .collect();
        assert!(baseline_from_stats(&history[1..]).is_none());

        let mut longer = history.clone();
        longer.push(ThermalStats {
            average: 24.0,
            ..ThermalStats::default()
        });
        // The oldest outlier has rolled out of the window
        assert_eq!(baseline_from_stats(&longer), Some(24.0));
    }

    #[test]
    fn test_thermal_event() {
        assert!(!detect_thermal_event(30.0, None));
        assert!(detect_thermal_event(27.0, Some(25.0)));
        assert!(!detect_thermal_event(26.9, Some(25.0)));
    }
}

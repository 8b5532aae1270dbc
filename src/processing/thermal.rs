// src/processing/thermal.rs
//! Thermal-frame conditioning
//!
//! Per frame, in order: subtract the drifting baseline, average over the last
//! few frames, blend with the previous output, then upscale for display.
//! Denoising and smoothing both round to 0.1 °C so that the display does not
//! flicker on sensor noise below the sensor's own resolution.

use crate::config::constants::thermal::{DEFAULT_DRIFT_FACTOR, DEFAULT_DRIFT_THRESHOLD};
use crate::config::{DisplayConfig, TemperatureUnit, ThermalConfig};
use ndarray::{Array2, Zip};
use std::collections::VecDeque;
use tracing::debug;

pub fn round_to_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

pub fn round_to_places(value: f32, places: u8) -> f32 {
    let scale = 10f32.powi(places as i32);
    (value * scale).round() / scale
}

/// Subtract the baseline from each cell with the default drift parameters
pub fn apply_baseline(frame: &Array2<f32>, baseline: &mut Array2<f32>, calibrating: bool) -> Array2<f32> {
    apply_baseline_with(frame, baseline, calibrating, DEFAULT_DRIFT_THRESHOLD, DEFAULT_DRIFT_FACTOR)
}

/// Per cell `diff = v - b`. Outside calibration, a small `|diff|` pulls the
/// baseline slowly toward the observation. Returns diffs rounded to 0.1.
///
/// # Panics
/// If `frame` and `baseline` differ in shape.
pub fn apply_baseline_with(
    frame: &Array2<f32>,
    baseline: &mut Array2<f32>,
    calibrating: bool,
    drift_threshold: f32,
    drift_factor: f32,
) -> Array2<f32> {
    let mut diffs = Array2::zeros(frame.raw_dim());
    Zip::from(&mut diffs)
        .and(frame)
        .and(baseline)
        .for_each(|out, &value, base| {
            let diff = value - *base;
            if !calibrating && diff.abs() < drift_threshold {
                *base += drift_factor * diff;
            }
            *out = round_to_tenth(diff);
        });
    diffs
}

/// Bounded FIFO of recent frames
#[derive(Debug, Clone)]
pub struct FrameHistory {
    window: usize,
    frames: VecDeque<Array2<f32>>,
}

impl FrameHistory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            frames: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, frame: Array2<f32>) {
        if self.frames.front().map_or(false, |f| f.raw_dim() != frame.raw_dim()) {
            self.frames.clear();
        }
        while self.frames.len() >= self.window {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Cellwise mean of the held frames
    pub fn mean(&self) -> Option<Array2<f32>> {
        let first = self.frames.front()?;
        let mut sum = Array2::<f32>::zeros(first.raw_dim());
        for frame in &self.frames {
            sum += frame;
        }
        Some(sum / self.frames.len() as f32)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Temporal average over the last N frames; pass-through when disabled
pub fn denoise(frame: &Array2<f32>, history: &mut FrameHistory, enabled: bool) -> Array2<f32> {
    if !enabled {
        return frame.clone();
    }
    history.push(frame.clone());
    match history.mean() {
        Some(mean) => mean.mapv(round_to_tenth),
        None => frame.clone(),
    }
}

/// `prev + factor * (new - prev)`, rounded to 0.1; the first frame passes through
pub fn smooth(frame: &Array2<f32>, previous: Option<&Array2<f32>>, factor: f32) -> Array2<f32> {
    match previous {
        Some(previous) if previous.raw_dim() == frame.raw_dim() => {
            let mut out = previous.clone();
            Zip::from(&mut out)
                .and(frame)
                .for_each(|prev, &new| *prev = round_to_tenth(*prev + factor * (new - *prev)));
            out
        }
        _ => frame.clone(),
    }
}

/// Exponential smoother that remembers its last output
#[derive(Debug, Clone)]
pub struct ExponentialSmoother {
    factor: f32,
    previous: Option<Array2<f32>>,
}

impl ExponentialSmoother {
    pub fn new(factor: f32) -> Self {
        Self {
            factor,
            previous: None,
        }
    }

    pub fn apply(&mut self, frame: &Array2<f32>) -> Array2<f32> {
        let out = smooth(frame, self.previous.as_ref(), self.factor);
        self.previous = Some(out.clone());
        out
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Bilinear resample to `target_rows x target_cols`. Source indices are
/// clamped to the grid, so every read is in range.
pub fn upscale(frame: &Array2<f32>, target_rows: usize, target_cols: usize) -> Array2<f32> {
    let (rows, cols) = frame.dim();
    if rows == 0 || cols == 0 || target_rows == 0 || target_cols == 0 {
        return Array2::zeros((target_rows, target_cols));
    }

    Array2::from_shape_fn((target_rows, target_cols), |(y, x)| {
        let source_y = y as f32 / target_rows as f32 * rows as f32;
        let source_x = x as f32 / target_cols as f32 * cols as f32;

        let y1 = (source_y.floor() as usize).min(rows - 1);
        let x1 = (source_x.floor() as usize).min(cols - 1);
        let y2 = (y1 + 1).min(rows - 1);
        let x2 = (x1 + 1).min(cols - 1);

        let fy = source_y - y1 as f32;
        let fx = source_x - x1 as f32;

        frame[[y1, x1]] * (1.0 - fx) * (1.0 - fy)
            + frame[[y1, x2]] * fx * (1.0 - fy)
            + frame[[y2, x1]] * (1.0 - fx) * fy
            + frame[[y2, x2]] * fx * fy
    })
}

/// Averages incoming frames into a fresh baseline while the operator calibrates
#[derive(Debug, Clone)]
pub struct BaselineCapture {
    target_frames: usize,
    sum: Option<Array2<f32>>,
    count: usize,
}

impl BaselineCapture {
    pub fn new(target_frames: usize) -> Self {
        Self {
            target_frames: target_frames.max(1),
            sum: None,
            count: 0,
        }
    }

    /// Add a frame; returns the new baseline once enough frames arrived
    pub fn add(&mut self, frame: &Array2<f32>) -> Option<Array2<f32>> {
        let compatible = self
            .sum
            .as_ref()
            .map_or(false, |sum| sum.raw_dim() == frame.raw_dim());
        match (compatible, self.sum.as_mut()) {
            (true, Some(sum)) => *sum += frame,
            _ => {
                self.sum = Some(frame.clone());
                self.count = 0;
            }
        }
        self.count += 1;

        if self.count >= self.target_frames {
            self.finish()
        } else {
            None
        }
    }

    /// Mean of what has been collected so far
    pub fn finish(&mut self) -> Option<Array2<f32>> {
        let sum = self.sum.take()?;
        let count = std::mem::take(&mut self.count).max(1);
        Some(sum / count as f32)
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.count, self.target_frames)
    }
}

/// Display-ready output for one thermal frame
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayFrame {
    pub timestamp: u64,
    /// Denoised and smoothed grid; a °C difference once a baseline exists,
    /// absolute °C before that
    pub calibrated: Array2<f32>,
    /// `calibrated` with the baseline added back, upscaled for display in the
    /// configured unit
    pub display: Array2<f32>,
    pub unit: TemperatureUnit,
    pub min: f32,
    pub max: f32,
    pub average: f32,
}

/// Per-session thermal processor
#[derive(Debug, Clone)]
pub struct ThermalProcessor {
    config: ThermalConfig,
    display: DisplayConfig,
    baseline: Option<Array2<f32>>,
    history: FrameHistory,
    smoother: ExponentialSmoother,
    capture: Option<BaselineCapture>,
}

impl ThermalProcessor {
    pub fn new(config: ThermalConfig, display: DisplayConfig) -> Self {
        Self {
            history: FrameHistory::new(config.denoise_window),
            smoother: ExponentialSmoother::new(config.smoothing_factor),
            config,
            display,
            baseline: None,
            capture: None,
        }
    }

    pub fn grid(&self) -> (usize, usize) {
        (self.config.grid_width, self.config.grid_height)
    }

    pub fn baseline(&self) -> Option<&Array2<f32>> {
        self.baseline.as_ref()
    }

    /// Install a baseline; history and smoother restart since earlier
    /// relative frames no longer apply
    pub fn set_baseline(&mut self, baseline: Array2<f32>) {
        self.baseline = Some(baseline);
        self.history.clear();
        self.smoother.reset();
    }

    pub fn start_baseline_capture(&mut self) {
        self.capture = Some(BaselineCapture::new(self.config.baseline_frames));
    }

    pub fn is_calibrating(&self) -> bool {
        self.capture.is_some()
    }

    /// Operator stop: keep whatever was collected
    pub fn stop_baseline_capture(&mut self) -> bool {
        match self.capture.take().and_then(|mut capture| capture.finish()) {
            Some(baseline) => {
                self.set_baseline(baseline);
                true
            }
            None => false,
        }
    }

    /// Run the conditioning pipeline over one absolute-temperature frame
    pub fn process(&mut self, frame: &Array2<f32>, timestamp: u64) -> DisplayFrame {
        let calibrating = self.capture.is_some();
        if let Some(capture) = self.capture.as_mut() {
            if let Some(baseline) = capture.add(frame) {
                debug!("Thermal baseline captured");
                self.capture = None;
                self.set_baseline(baseline);
            }
        }

        if self.baseline.as_ref().map_or(false, |b| b.raw_dim() != frame.raw_dim()) {
            self.baseline = None;
        }
        // Without a baseline, frames pass through as absolute temperatures
        let relative = match self.baseline.as_mut() {
            Some(baseline) => apply_baseline_with(
                frame,
                baseline,
                calibrating,
                self.config.drift_threshold,
                self.config.drift_factor,
            ),
            None => frame.clone(),
        };

        let denoised = denoise(&relative, &mut self.history, self.config.denoise_enabled);
        let calibrated = if self.config.denoise_enabled {
            self.smoother.apply(&denoised)
        } else {
            denoised
        };

        let conditioned = match &self.baseline {
            Some(baseline) => (&calibrated + baseline).mapv(round_to_tenth),
            None => calibrated.clone(),
        };

        let size = self.config.display_size;
        let unit = self.display.temperature_unit;
        let places = self.display.decimal_places;
        let display = upscale(&conditioned, size, size).mapv(|c| round_to_places(unit.from_celsius(c), places));

        let (min, max, sum) = conditioned
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY, 0.0f32), |(lo, hi, sum), &v| {
                (lo.min(v), hi.max(v), sum + v)
            });
        let average = if conditioned.is_empty() { 0.0 } else { sum / conditioned.len() as f32 };

        DisplayFrame {
            timestamp,
            calibrated,
            display,
            unit,
            min: round_to_places(unit.from_celsius(min), places),
            max: round_to_places(unit.from_celsius(max), places),
            average: round_to_places(unit.from_celsius(average), places),
        }
    }

    /// Clear baseline, history and smoother state
    pub fn reset(&mut self) {
        self.baseline = None;
        self.history.clear();
        self.smoother.reset();
        self.capture = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_apply_baseline_drifts_small_diffs_only() {
        let frame = array![[25.3, 30.0]];
        let mut baseline = array![[25.0, 25.0]];

        let diff = apply_baseline(&frame, &mut baseline, false);
        assert_eq!(diff, array![[0.3, 5.0]]);
        assert!((baseline[[0, 0]] - 25.006).abs() < 1e-5);
        assert_eq!(baseline[[0, 1]], 25.0);
    }

    #[test]
    fn test_apply_baseline_frozen_while_calibrating() {
        let frame = array![[25.3, 24.9]];
        let mut baseline = array![[25.0, 25.0]];

        let first = apply_baseline(&frame, &mut baseline, true);
        let second = apply_baseline(&frame, &mut baseline, true);
        assert_eq!(first, second);
        assert_eq!(baseline, array![[25.0, 25.0]]);
    }

    #[test]
    fn test_denoise_window() {
        let mut history = FrameHistory::new(2);
        assert_eq!(denoise(&array![[1.0]], &mut history, true), array![[1.0]]);
        assert_eq!(denoise(&array![[2.0]], &mut history, true), array![[1.5]]);
        assert_eq!(denoise(&array![[4.0]], &mut history, true), array![[3.0]]);
        assert_eq!(history.len(), 2);

        assert_eq!(denoise(&array![[9.0]], &mut history, false), array![[9.0]]);
    }

    #[test]
    fn test_smooth() {
        let previous = array![[10.0]];
        assert_eq!(smooth(&array![[20.0]], Some(&previous), 0.2), array![[12.0]]);
        assert_eq!(smooth(&array![[20.0]], None, 0.2), array![[20.0]]);
    }

    #[test]
    fn test_upscale_shape_and_corners() {
        let frame = Array2::from_shape_fn((8, 8), |(y, x)| (y * 8 + x) as f32);
        let up = upscale(&frame, 32, 32);

        assert_eq!(up.dim(), (32, 32));
        assert_eq!(up[[0, 0]], 0.0);
        // Last row/column read the clamped edge cell only
        assert_eq!(up[[31, 31]], 63.0);
        assert!(up.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_upscale_uniform_frame() {
        let frame = Array2::from_elem((8, 8), 22.5f32);
        let up = upscale(&frame, 32, 32);
        assert!(up.iter().all(|&v| (v - 22.5).abs() < 1e-4));
    }

    #[test]
    fn test_baseline_capture_mean() {
        let mut capture = BaselineCapture::new(2);
        assert!(capture.add(&array![[20.0, 22.0]]).is_none());
        assert_eq!(capture.progress(), (1, 2));
        let baseline = capture.add(&array![[22.0, 24.0]]).unwrap();
        assert_eq!(baseline, array![[21.0, 23.0]]);
    }

    #[test]
    fn test_processor_pipeline() {
        let mut processor = ThermalProcessor::new(ThermalConfig::default(), DisplayConfig::default());
        let frame = Array2::from_elem((8, 8), 25.0f32);

        processor.start_baseline_capture();
        for ts in 0..10 {
            processor.process(&frame, ts);
        }
        assert!(!processor.is_calibrating());
        assert_eq!(processor.baseline(), Some(&frame));

        let out = processor.process(&frame, 10);
        assert!(out.calibrated.iter().all(|&v| v == 0.0));
        assert_eq!(out.display.dim(), (32, 32));
        assert_eq!(out.average, 25.0);

        processor.reset();
        assert!(processor.baseline().is_none());
    }

    #[test]
    fn test_display_follows_conditioned_grid() {
        let mut processor = ThermalProcessor::new(ThermalConfig::default(), DisplayConfig::default());
        processor.process(&Array2::from_elem((8, 8), 20.0f32), 0);
        let out = processor.process(&Array2::from_elem((8, 8), 30.0f32), 100);

        // Denoised to 25, then smoothed from 20
        let expected = out.calibrated[[0, 0]];
        assert!(expected < 25.0);
        assert!(out.display.iter().all(|&v| (v - expected).abs() < 1e-3));
        assert!((out.max - expected).abs() < 1e-3);
        assert!((out.average - expected).abs() < 1e-3);
    }

    #[test]
    fn test_display_adds_baseline_back() {
        let mut processor = ThermalProcessor::new(ThermalConfig::default(), DisplayConfig::default());
        processor.set_baseline(Array2::from_elem((8, 8), 22.0f32));

        let mut frame = Array2::from_elem((8, 8), 22.0f32);
        frame[[0, 0]] = 32.0;
        let out = processor.process(&frame, 0);

        assert_eq!(out.calibrated[[0, 0]], 10.0);
        assert_eq!(out.calibrated[[7, 7]], 0.0);
        assert_eq!(out.display[[0, 0]], 32.0);
        assert_eq!(out.max, 32.0);
        assert_eq!(out.min, 22.0);
    }

    #[test]
    fn test_no_baseline_passes_frames_through() {
        let mut processor = ThermalProcessor::new(ThermalConfig::default(), DisplayConfig::default());
        let frame = Array2::from_elem((8, 8), 0.3f32);

        let out = processor.process(&frame, 0);
        assert!(processor.baseline().is_none());
        assert_eq!(out.calibrated, frame);

        processor.process(&frame, 100);
        assert!(processor.baseline().is_none());
    }

    #[test]
    fn test_processor_fahrenheit_display() {
        let display = DisplayConfig {
            temperature_unit: TemperatureUnit::Fahrenheit,
            decimal_places: 1,
        };
        let mut processor = ThermalProcessor::new(ThermalConfig::default(), display);
        let out = processor.process(&Array2::from_elem((8, 8), 37.0f32), 0);

        assert_eq!(out.unit, TemperatureUnit::Fahrenheit);
        assert!((out.max - 98.6).abs() < 1e-3);
    }
}

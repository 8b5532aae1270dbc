// src/transport/simulated.rs
//! Simulated pull sources for running without hardware

use crate::error::TransportError;
use crate::transport::traits::PullSource;
use crate::utils::time::TimeProvider;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Resting muscle activity range of the simulated sensor (raw ADC counts)
const REST_MIN: f32 = 400.0;
const REST_SPAN: f32 = 200.0;
/// Probability that a pull lands inside a contraction burst
const BURST_PROBABILITY: f32 = 0.05;
const BURST_LENGTH: u32 = 4;
const BURST_AMPLITUDE: f32 = 900.0;

/// Muscle envelopes with resting noise and occasional contractions
pub struct SimulatedMuscleSource {
    clock: Arc<dyn TimeProvider>,
    burst_remaining: AtomicU32,
}

impl SimulatedMuscleSource {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            clock,
            burst_remaining: AtomicU32::new(0),
        }
    }

    fn next_raw(&self) -> u16 {
        let mut raw = REST_MIN + rand::random::<f32>() * REST_SPAN;

        let remaining = self.burst_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.burst_remaining.store(remaining - 1, Ordering::Relaxed);
            raw += BURST_AMPLITUDE * (0.7 + 0.3 * rand::random::<f32>());
        } else if rand::random::<f32>() < BURST_PROBABILITY {
            self.burst_remaining.store(BURST_LENGTH, Ordering::Relaxed);
        }

        raw.clamp(0.0, 4095.0) as u16
    }
}

#[async_trait]
impl PullSource for SimulatedMuscleSource {
    async fn pull(&self) -> Result<String, TransportError> {
        let raw = self.next_raw();
        Ok(json!({
            "timestamp": self.clock.now_millis(),
            "muscleActivity": raw,
        })
        .to_string())
    }

    fn endpoint(&self) -> String {
        "simulated://muscle".to_string()
    }
}

/// Thermal frames with a warm centre, cooler edges and gaussian noise
pub struct SimulatedThermalSource {
    clock: Arc<dyn TimeProvider>,
    width: usize,
    height: usize,
    ambient_c: f32,
}

impl SimulatedThermalSource {
    pub fn new(clock: Arc<dyn TimeProvider>, width: usize, height: usize) -> Self {
        Self {
            clock,
            width,
            height,
            ambient_c: 25.0,
        }
    }

    fn frame(&self) -> Vec<Vec<f32>> {
        let cx = (self.width as f32 - 1.0) / 2.0;
        let cy = (self.height as f32 - 1.0) / 2.0;

        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| {
                        let distance = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                        let variation = (15.0 - distance * 2.0).max(0.0);
                        let value = self.ambient_c + variation + gaussian() * 0.5;
                        (value * 10.0).round() / 10.0
                    })
                    .collect()
            })
            .collect()
    }
}

fn gaussian() -> f32 {
    // Box-Muller; keep u1 away from zero so ln stays finite
    let u1 = rand::random::<f32>().max(f32::MIN_POSITIVE);
    let u2 = rand::random::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

#[async_trait]
impl PullSource for SimulatedThermalSource {
    async fn pull(&self) -> Result<String, TransportError> {
        Ok(json!({
            "type": "thermal_data",
            "timestamp": self.clock.now_millis(),
            "thermal_data": self.frame(),
            "sensor_info": { "type": "AMG8833", "status": "simulated" },
            "grid_size": { "width": self.width, "height": self.height },
        })
        .to_string())
    }

    fn endpoint(&self) -> String {
        "simulated://thermal".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::types::{parse_muscle_payload, parse_thermal_payload};
    use crate::utils::time::MockTimeProvider;

    #[tokio::test]
    async fn test_simulated_muscle_parses() {
        let source = SimulatedMuscleSource::new(Arc::new(MockTimeProvider::new(42_000)));
        for _ in 0..50 {
            let body = source.pull().await.unwrap();
            let msg = parse_muscle_payload(&body, 4095).unwrap();
            assert_eq!(msg.samples.len(), 1);
            assert_eq!(msg.samples[0].timestamp, 42_000);
            assert!(msg.samples[0].raw_value >= 400);
        }
    }

    #[tokio::test]
    async fn test_simulated_thermal_parses() {
        let source = SimulatedThermalSource::new(Arc::new(MockTimeProvider::new(1)), 8, 8);
        let body = source.pull().await.unwrap();
        let msg = parse_thermal_payload(&body, (8, 8)).unwrap();

        let frame = msg.frame.unwrap();
        // Centre is warmer than the corner
        assert!(frame[[3, 3]] > frame[[0, 0]]);
    }
}

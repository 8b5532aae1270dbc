// src/discovery/mod.rs
//! Locating the sensor host among an ordered list of candidate addresses

pub mod probe;

pub use probe::{HttpProbe, Probe};

use crate::config::TelemetryConfig;
use crate::error::{TelemetryError, TelemetryResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Probes candidates strictly in priority order and stops at the first hit
pub struct DeviceDiscovery {
    probe: Arc<dyn Probe>,
    candidates: Vec<String>,
    timeout: Duration,
}

impl DeviceDiscovery {
    pub fn new(probe: Arc<dyn Probe>, candidates: Vec<String>, timeout: Duration) -> Self {
        Self {
            probe,
            candidates,
            timeout,
        }
    }

    /// HTTP discovery over the configured candidates
    pub fn from_config(config: &TelemetryConfig) -> Self {
        let probe = HttpProbe::new(
            config.transport.pull_port,
            config.discovery.probe_path.clone(),
            (config.thermal.grid_width, config.thermal.grid_height),
        );
        Self::new(
            Arc::new(probe),
            config.discovery.candidates.clone(),
            Duration::from_millis(config.discovery.probe_timeout_ms),
        )
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// First responding candidate, or `None` when all fail.
    /// Each candidate is probed at most once.
    pub async fn discover(&self, candidates: &[String]) -> Option<String> {
        for (index, address) in candidates.iter().enumerate() {
            if self.probe.probe(address, self.timeout).await {
                info!(%address, position = index + 1, "Sensor discovered");
                return Some(address.clone());
            }
        }
        warn!(candidates = candidates.len(), "No discovery candidate responded");
        None
    }

    /// Discover over the configured candidates, surfacing "not found"
    pub async fn discover_or_err(&self) -> TelemetryResult<String> {
        self.discover(&self.candidates)
            .await
            .ok_or_else(|| TelemetryError::DiscoveryExhausted {
                candidates: self.candidates.len(),
                context: crate::error_context!("discovery", "discover"),
            })
    }

    /// Discovered host, or `primary` when nothing answers
    pub async fn configured_or_discovered(&self, primary: &str) -> String {
        match self.discover_or_err().await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, fallback = %primary, "Using configured sensor host");
                primary.to_string()
            }
        }
    }
}

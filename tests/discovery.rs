// tests/discovery.rs
//! Candidate ordering and short-circuit behaviour of device discovery

use async_trait::async_trait;
use biosignal_core::discovery::{DeviceDiscovery, Probe};
use biosignal_core::error::TelemetryError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Answers `true` only for the listed addresses and records every probe
struct RecordingProbe {
    live: Vec<String>,
    probed: Mutex<Vec<String>>,
}

impl RecordingProbe {
    fn new(live: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            live: live.iter().map(|s| s.to_string()).collect(),
            probed: Mutex::new(Vec::new()),
        })
    }

    fn probed(&self) -> Vec<String> {
        self.probed.lock().clone()
    }
}

#[async_trait]
impl Probe for RecordingProbe {
    async fn probe(&self, address: &str, _timeout: Duration) -> bool {
        self.probed.lock().push(address.to_string());
        self.live.iter().any(|live| live == address)
    }
}

fn candidates() -> Vec<String> {
    ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn discovery(probe: Arc<RecordingProbe>) -> DeviceDiscovery {
    DeviceDiscovery::new(probe, candidates(), Duration::from_secs(3))
}

#[tokio::test]
async fn test_third_of_five_wins_and_nothing_after_is_probed() {
    let probe = RecordingProbe::new(&["10.0.0.3"]);
    let found = discovery(probe.clone()).discover(&candidates()).await;

    assert_eq!(found.as_deref(), Some("10.0.0.3"));
    assert_eq!(probe.probed(), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
}

#[tokio::test]
async fn test_priority_order_beats_later_live_candidates() {
    let probe = RecordingProbe::new(&["10.0.0.4", "10.0.0.2"]);
    let found = discovery(probe.clone()).discover(&candidates()).await;
    assert_eq!(found.as_deref(), Some("10.0.0.2"));
    assert_eq!(probe.probed().len(), 2);
}

#[tokio::test]
async fn test_exhausted_probes_each_candidate_once() {
    let probe = RecordingProbe::new(&[]);
    let discovery = discovery(probe.clone());

    assert!(discovery.discover(&candidates()).await.is_none());
    assert_eq!(probe.probed(), candidates());

    match discovery.discover_or_err().await {
        Err(TelemetryError::DiscoveryExhausted { candidates, .. }) => assert_eq!(candidates, 5),
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_configured_host_used_when_nothing_answers() {
    let probe = RecordingProbe::new(&[]);
    let host = discovery(probe).configured_or_discovered("192.168.1.100").await;
    assert_eq!(host, "192.168.1.100");
}

#[tokio::test]
async fn test_empty_candidate_list() {
    let probe = RecordingProbe::new(&["10.0.0.1"]);
    assert!(discovery(probe.clone()).discover(&[]).await.is_none());
    assert!(probe.probed().is_empty());
}

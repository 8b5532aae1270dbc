// tests/tracker_scenarios.rs
//! Liveness scenarios for the connection state tracker

use biosignal_core::config::{TelemetryConfig, TrackerConfig};
use biosignal_core::connection::ConnectionStateTracker;
use biosignal_core::types::{ConnectionState, SensorKind};
use proptest::prelude::*;

fn tracker_config(stream: SensorKind) -> TrackerConfig {
    TelemetryConfig::default().connection.tracker_config(stream)
}

fn tracker(stream: SensorKind) -> ConnectionStateTracker {
    ConnectionStateTracker::new(stream, tracker_config(stream))
}

#[test]
fn test_old_heartbeat_means_disconnected() {
    let mut tracker = tracker(SensorKind::Thermal);
    tracker.record_heartbeat(0);
    assert_eq!(tracker.evaluate(0).map(|c| c.to), Some(ConnectionState::Connected));

    let change = tracker.evaluate(40_000).expect("transition");
    assert_eq!(change.from, ConnectionState::Connected);
    assert_eq!(change.to, ConnectionState::Disconnected);
    assert_eq!(change.at, 40_000);
    assert_eq!(tracker.last_transition_at(), Some(40_000));
}

#[test]
fn test_first_connection_is_immediate() {
    let mut tracker = tracker(SensorKind::Muscle);
    assert!(tracker.mark_connecting(0).is_some());
    tracker.record_sample(500);
    // Well inside the dwell window, but this is the first connection
    let change = tracker.evaluate(500).expect("transition");
    assert_eq!(change.from, ConnectionState::Connecting);
    assert_eq!(change.to, ConnectionState::Connected);
}

#[test]
fn test_grey_zone_holds_connected() {
    let mut tracker = tracker(SensorKind::Muscle);
    tracker.record_sample(0);
    tracker.evaluate(0);

    // No longer fresh, not yet clearly stale
    for now in [31_000, 33_000, 35_000] {
        assert!(!tracker.should_be_connected(now));
        assert!(tracker.evaluate(now).is_none());
        assert_eq!(tracker.state(), ConnectionState::Connected);
    }

    // Heartbeat stale after 35 s, sample stale after 45 s
    assert!(tracker.evaluate(45_000).is_none());
    assert_eq!(tracker.evaluate(45_001).map(|c| c.to), Some(ConnectionState::Disconnected));
}

#[test]
fn test_reconnect_waits_out_dwell() {
    let mut tracker = tracker(SensorKind::Muscle);
    tracker.record_sample(0);
    tracker.evaluate(0);
    tracker.evaluate(46_000).expect("disconnect");

    tracker.record_sample(47_000);
    for now in [47_000, 50_000, 55_999] {
        assert!(tracker.should_be_connected(now));
        assert!(tracker.evaluate(now).is_none(), "flapped at {}", now);
    }
    assert_eq!(tracker.evaluate(56_000).map(|c| c.to), Some(ConnectionState::Connected));
}

#[test]
fn test_forced_demotion_ignores_dwell() {
    let mut tracker = tracker(SensorKind::Thermal);
    tracker.record_sample(1_000);
    tracker.evaluate(1_000);

    let change = tracker.force_disconnected(1_500).expect("forced");
    assert_eq!(change.to, ConnectionState::Disconnected);
    assert!(tracker.force_disconnected(1_600).is_none());

    // Promotion after a forced demotion honours the dwell again
    tracker.record_sample(2_000);
    assert!(tracker.evaluate(2_000).is_none());
    tracker.record_sample(11_400);
    assert!(tracker.evaluate(11_500).is_some());
}

#[test]
fn test_connecting_gives_up_when_stale() {
    let mut tracker = tracker(SensorKind::Thermal);
    tracker.mark_connecting(0).expect("connecting");
    assert!(tracker.mark_connecting(1_000).is_none());

    assert!(tracker.evaluate(5_000).is_none());
    let change = tracker.evaluate(10_000).expect("gave up");
    assert_eq!(change.from, ConnectionState::Connecting);
    assert_eq!(change.to, ConnectionState::Disconnected);
}

#[test]
fn test_streams_have_their_own_recent_window() {
    let mut muscle = tracker(SensorKind::Muscle);
    let mut thermal = tracker(SensorKind::Thermal);
    muscle.record_sample(0);
    thermal.record_sample(0);

    // Heartbeat timeout is 30 s for both; only the sample window differs
    assert!(muscle.should_be_connected(20_000));
    assert!(thermal.should_be_connected(20_000));
    assert_eq!(tracker_config(SensorKind::Muscle).recent_data_ms, 10_000);
    assert_eq!(tracker_config(SensorKind::Thermal).recent_data_ms, 30_000);
}

#[derive(Debug, Clone)]
enum Step {
    Heartbeat,
    Sample,
    Evaluate,
    Connecting,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => Just(Step::Heartbeat),
        1 => Just(Step::Sample),
        3 => Just(Step::Evaluate),
        1 => Just(Step::Connecting),
    ]
}

proptest! {
    #[test]
    fn prop_transitions_respect_dwell(steps in prop::collection::vec((0u64..8_000, step()), 1..200)) {
        let config = tracker_config(SensorKind::Muscle);
        let mut tracker = ConnectionStateTracker::new(SensorKind::Muscle, config);
        let mut now = 0u64;
        let mut last: Option<u64> = None;
        let mut ever_connected = false;

        for (delta, step) in steps {
            now += delta;
            let change = match step {
                Step::Heartbeat => { tracker.record_heartbeat(now); None }
                Step::Sample => { tracker.record_sample(now); None }
                Step::Evaluate => tracker.evaluate(now),
                Step::Connecting => tracker.mark_connecting(now),
            };

            if let Some(change) = change {
                prop_assert_ne!(change.from, change.to);
                let exempt = change.to == ConnectionState::Connected && !ever_connected;
                if let (Some(previous), false) = (last, exempt) {
                    prop_assert!(change.at - previous >= config.dwell_ms);
                }
                if change.to == ConnectionState::Connected {
                    ever_connected = true;
                }
                last = Some(change.at);
            }
            prop_assert_eq!(tracker.last_transition_at(), last);
        }
    }

    #[test]
    fn prop_evaluate_is_idempotent(samples in prop::collection::vec(0u64..100_000, 0..20), now in 0u64..200_000) {
        let mut tracker = ConnectionStateTracker::new(SensorKind::Thermal, tracker_config(SensorKind::Thermal));
        for at in samples.into_iter().filter(|at| *at <= now) {
            tracker.record_sample(at);
        }
        tracker.evaluate(now);
        prop_assert!(tracker.evaluate(now).is_none());
    }
}

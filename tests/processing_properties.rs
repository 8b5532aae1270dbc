// tests/processing_properties.rs
//! Property tests for signal conditioning and movement annotation

use biosignal_core::processing::annotation::annotate;
use biosignal_core::processing::calibration::CalibrationRange;
use biosignal_core::processing::muscle::{detect_move, to_activation_percent};
use biosignal_core::processing::thermal::{apply_baseline, upscale};
use biosignal_core::types::{MarkerKind, MoveMarker, ProcessedSample, RawSample};
use ndarray::Array2;
use proptest::prelude::*;

fn marker() -> impl Strategy<Value = MoveMarker> {
    (0u64..10_000, 0u8..3).prop_map(|(timestamp, kind)| {
        let kind = match kind {
            0 => MarkerKind::Request,
            1 => MarkerKind::Sensed,
            _ => MarkerKind::End,
        };
        MoveMarker::new(timestamp, kind)
    })
}

fn sample() -> impl Strategy<Value = ProcessedSample> {
    (0u64..10_000, 0.0f32..3.3).prop_map(|(timestamp, voltage)| ProcessedSample {
        raw: RawSample {
            timestamp,
            raw_value: 0,
            voltage: Some(voltage),
        },
        voltage,
        activation_percent: 0.0,
    })
}

fn frame(rows: usize, cols: usize) -> impl Strategy<Value = Array2<f32>> {
    prop::collection::vec(15.0f32..40.0, rows * cols)
        .prop_map(move |cells| Array2::from_shape_vec((rows, cols), cells).expect("shape"))
}

proptest! {
    #[test]
    fn prop_periods_are_disjoint_and_well_formed(
        markers in prop::collection::vec(marker(), 0..30),
        samples in prop::collection::vec(sample(), 0..60),
    ) {
        let periods = annotate(&markers, &samples);

        for period in &periods {
            prop_assert!(period.start.kind.opens_period());
            prop_assert_eq!(period.end.kind, MarkerKind::End);
            prop_assert!(period.start.timestamp <= period.end.timestamp);
            prop_assert!(markers.contains(&period.start));
            prop_assert!(markers.contains(&period.end));
        }
        for pair in periods.windows(2) {
            prop_assert!(pair[0].end.timestamp < pair[1].start.timestamp);
        }

        // Every end marker closes at most one period
        let ends_available = markers.iter().filter(|m| m.kind == MarkerKind::End).count();
        prop_assert!(periods.len() <= ends_available);
    }

    #[test]
    fn prop_peak_is_the_window_maximum(
        markers in prop::collection::vec(marker(), 0..30),
        samples in prop::collection::vec(sample(), 0..60),
    ) {
        for period in annotate(&markers, &samples) {
            let window = period.start.timestamp..=period.end.timestamp;
            prop_assert!(window.contains(&period.peak.timestamp()));
            for s in samples.iter().filter(|s| window.contains(&s.timestamp())) {
                prop_assert!(period.peak.voltage >= s.voltage);
            }
        }
    }

    #[test]
    fn prop_activation_bounded_and_monotonic(
        min in 0.0f32..2_000.0,
        span in 1.0f32..2_000.0,
        a in 0.0f32..4_095.0,
        b in 0.0f32..4_095.0,
    ) {
        let range = CalibrationRange { min, max: min + span };
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let p_low = to_activation_percent(low, Some(&range));
        let p_high = to_activation_percent(high, Some(&range));

        prop_assert!((0.0..=100.0).contains(&p_low));
        prop_assert!((0.0..=100.0).contains(&p_high));
        prop_assert!(p_low <= p_high);
    }

    #[test]
    fn prop_detect_move_needs_history(current in 0.0f32..3.3, previous in 0.0f32..3.3, threshold in 0.01f32..1.0) {
        prop_assert!(!detect_move(current, None, threshold));
        let first = detect_move(current, Some(previous), threshold);
        prop_assert_eq!(first, detect_move(current, Some(previous), threshold));
        prop_assert_eq!(first, (current - previous).abs() >= threshold);
    }

    #[test]
    fn prop_baseline_frozen_while_calibrating(f in frame(8, 8), b in frame(8, 8)) {
        let mut baseline = b.clone();
        let first = apply_baseline(&f, &mut baseline, true);
        let second = apply_baseline(&f, &mut baseline, true);
        prop_assert_eq!(&baseline, &b);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_upscale_stays_within_source_range(f in frame(8, 8), size in 8usize..64) {
        let out = upscale(&f, size, size);
        let lo = f.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = f.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        prop_assert_eq!(out.dim(), (size, size));
        for v in out.iter() {
            prop_assert!(*v >= lo - 1e-3 && *v <= hi + 1e-3);
        }
    }
}

#[test]
fn test_activation_examples() {
    let range = CalibrationRange { min: 0.0, max: 100.0 };
    assert_eq!(to_activation_percent(0.0, Some(&range)), 0.0);
    assert_eq!(to_activation_percent(100.0, Some(&range)), 100.0);
    assert_eq!(to_activation_percent(150.0, Some(&range)), 100.0);
}

#[test]
fn test_single_period_example() {
    let markers = [
        MoveMarker::request(1_000),
        MoveMarker::sensed(1_500),
        MoveMarker::end(2_000),
    ];
    let samples: Vec<ProcessedSample> = [(1_200u64, 0.9f32), (1_700, 2.1), (1_950, 1.3)]
        .iter()
        .map(|&(timestamp, voltage)| ProcessedSample {
            raw: RawSample {
                timestamp,
                raw_value: 0,
                voltage: Some(voltage),
            },
            voltage,
            activation_percent: 0.0,
        })
        .collect();

    let periods = annotate(&markers, &samples);
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].peak.timestamp(), 1_700);
    assert_eq!(periods[0].peak.voltage, 2.1);
}

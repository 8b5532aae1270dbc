// src/processing/annotation.rs
//! Pairs move markers into bounded movement periods with their peak sample

use crate::types::{MarkerKind, MoveMarker, MovementPeriod, ProcessedSample};

/// Build movement periods from a marker timeline and the samples it annotates.
///
/// Markers are visited in timestamp order. A request or sensed marker opens a
/// period unless it falls inside one already emitted; it closes on the first
/// unused end marker at or after it. Each end marker closes at most one
/// period. The peak is the sample with the highest finite voltage inside
/// `[start, end]` (earliest wins on ties). Starts without an end, and periods
/// that contain no samples, produce nothing.
pub fn annotate(markers: &[MoveMarker], samples: &[ProcessedSample]) -> Vec<MovementPeriod> {
    let mut ordered: Vec<MoveMarker> = markers.to_vec();
    // Ends sort after starts sharing their timestamp
    ordered.sort_by_key(|marker| (marker.timestamp, marker.kind == MarkerKind::End));

    let mut used_ends = vec![false; ordered.len()];
    let mut claimed_until: Option<u64> = None;
    let mut periods = Vec::new();

    for (index, start) in ordered.iter().enumerate() {
        if !start.kind.opens_period() {
            continue;
        }
        if claimed_until.map_or(false, |until| start.timestamp <= until) {
            continue;
        }

        let Some(end_index) = find_end(&ordered, &used_ends, index) else {
            continue;
        };
        used_ends[end_index] = true;
        let end = ordered[end_index];
        claimed_until = Some(end.timestamp);

        if let Some(peak) = peak_between(samples, start.timestamp, end.timestamp) {
            periods.push(MovementPeriod {
                start: *start,
                end,
                peak,
            });
        }
    }

    periods
}

fn find_end(ordered: &[MoveMarker], used_ends: &[bool], start_index: usize) -> Option<usize> {
    let start_ts = ordered[start_index].timestamp;
    ordered
        .iter()
        .enumerate()
        .skip(start_index + 1)
        .find(|(i, marker)| {
            marker.kind == MarkerKind::End && !used_ends[*i] && marker.timestamp >= start_ts
        })
        .map(|(i, _)| i)
}

/// Highest finite voltage inside the inclusive window
pub fn peak_between(samples: &[ProcessedSample], start: u64, end: u64) -> Option<ProcessedSample> {
    samples
        .iter()
        .filter(|s| (start..=end).contains(&s.timestamp()) && s.voltage.is_finite())
        .fold(None, |best: Option<&ProcessedSample>, s| match best {
            Some(b) if b.voltage >= s.voltage => Some(b),
            _ => Some(s),
        })
        .copied()
}

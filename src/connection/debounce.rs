// src/connection/debounce.rs
//! Minimum-dwell guard for state transitions

/// Tracks when the last transition happened and whether enough time has passed
/// for another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceGuard {
    min_dwell_ms: u64,
    last_transition_at: Option<u64>,
}

impl DebounceGuard {
    pub fn new(min_dwell_ms: u64) -> Self {
        Self {
            min_dwell_ms,
            last_transition_at: None,
        }
    }

    /// True when no transition happened yet or the dwell has fully elapsed
    pub fn dwell_satisfied(&self, now_ms: u64) -> bool {
        match self.last_transition_at {
            None => true,
            Some(at) => now_ms.saturating_sub(at) >= self.min_dwell_ms,
        }
    }

    /// Milliseconds until the next transition is allowed
    pub fn remaining(&self, now_ms: u64) -> u64 {
        match self.last_transition_at {
            None => 0,
            Some(at) => self.min_dwell_ms.saturating_sub(now_ms.saturating_sub(at)),
        }
    }

    pub fn record(&mut self, now_ms: u64) {
        self.last_transition_at = Some(now_ms);
    }

    pub fn last_transition_at(&self) -> Option<u64> {
        self.last_transition_at
    }

    pub fn min_dwell_ms(&self) -> u64 {
        self.min_dwell_ms
    }

    pub fn reset(&mut self) {
        self.last_transition_at = None;
    }
}

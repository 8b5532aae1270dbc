// src/connection/failures.rs
//! Consecutive transport-failure accounting

use std::time::Duration;

/// Result of recording one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still under the threshold; carries the running count
    Counted(u32),
    /// Threshold reached; the caller must force the stream down and pause
    Tripped(u32),
}

/// Counts consecutive transport failures for one stream.
///
/// Any success resets the counter. Reaching the threshold trips the governor;
/// the acquisition loop then waits out [`FailureGovernor::cooldown`] and calls
/// [`FailureGovernor::reset`] before polling again.
#[derive(Debug, Clone)]
pub struct FailureGovernor {
    threshold: u32,
    cooldown: Duration,
    consecutive: u32,
}

impl FailureGovernor {
    pub fn new(threshold: u32, cooldown_ms: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown: Duration::from_millis(cooldown_ms),
            consecutive: 0,
        }
    }

    pub fn record_failure(&mut self) -> FailureOutcome {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= self.threshold {
            FailureOutcome::Tripped(self.consecutive)
        } else {
            FailureOutcome::Counted(self.consecutive)
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
